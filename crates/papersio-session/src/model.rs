use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Terminated,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    None,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Academic,
    Web,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub authors: Vec<String>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Status { stage: String, details: String },
    Result { answer: String, sources: Vec<Source> },
    Error { message: String },
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Status { .. } => "status",
            InboundEvent::Result { .. } => "result",
            InboundEvent::Error { .. } => "error",
        }
    }
}

/// The finished report. Fields are private so a built response cannot be
/// edited after assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchResponse {
    query: String,
    answer: String,
    sources: Vec<Source>,
    strategy_label: String,
}

impl ResearchResponse {
    pub(crate) fn new(
        query: String,
        answer: String,
        sources: Vec<Source>,
        strategy_label: String,
    ) -> Self {
        Self {
            query,
            answer,
            sources,
            strategy_label,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn strategy_label(&self) -> &str {
        &self.strategy_label
    }

    pub fn academic_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources
            .iter()
            .filter(|source| source.kind == SourceKind::Academic)
    }

    pub fn web_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources
            .iter()
            .filter(|source| source.kind == SourceKind::Web)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    pub query: String,
    pub state: SessionState,
    pub terminal_kind: TerminalKind,
    pub current_stage: String,
    pub stage_details: String,
    pub displayed_progress: u8,
    pub result: Option<ResearchResponse>,
    pub error: Option<SessionFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn idle() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: String::new(),
            state: SessionState::Idle,
            terminal_kind: TerminalKind::None,
            current_stage: String::new(),
            stage_details: String::new(),
            displayed_progress: 0,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub(crate) fn connecting(query: String) -> Self {
        Self {
            query,
            state: SessionState::Connecting,
            started_at: Some(Utc::now()),
            ..Self::idle()
        }
    }

    /// True while a channel may exist for this session.
    pub fn is_live(&self) -> bool {
        matches!(self.state, SessionState::Connecting | SessionState::Open)
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, kind: SourceKind) -> Source {
        Source {
            title: title.to_string(),
            url: format!("https://example.org/{title}"),
            kind,
            authors: Vec::new(),
        }
    }

    #[test]
    fn idle_session_is_not_live() {
        let session = Session::idle();
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.terminal_kind, TerminalKind::None);
        assert!(!session.is_live());
        assert!(session.result.is_none() && session.error.is_none());
    }

    #[test]
    fn connecting_session_gets_fresh_id() {
        let idle = Session::idle();
        let next = Session::connecting("graphene".to_string());
        assert_ne!(idle.id, next.id);
        assert!(next.is_live());
        assert!(next.started_at.is_some());
    }

    #[test]
    fn source_projections_keep_relative_order() {
        let response = ResearchResponse::new(
            "q".to_string(),
            "a".to_string(),
            vec![
                source("w1", SourceKind::Web),
                source("p1", SourceKind::Academic),
                source("w2", SourceKind::Web),
                source("p2", SourceKind::Academic),
            ],
            "live".to_string(),
        );
        let academic: Vec<_> = response.academic_sources().map(|s| s.title.as_str()).collect();
        let web: Vec<_> = response.web_sources().map(|s| s.title.as_str()).collect();
        assert_eq!(academic, vec!["p1", "p2"]);
        assert_eq!(web, vec!["w1", "w2"]);
        assert_eq!(response.sources().len(), 4);
    }
}
