use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::model::SessionState;

/// Every failure a research session can run into.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResearchError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol error: {reason}")]
    Protocol { reason: String, raw: String },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("no update from the research service for {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    EmptyQueryError,
    ConnectionError,
    ProtocolError,
    RemoteError,
    ExportError,
    TimeoutError,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::EmptyQueryError => "empty_query",
            ErrorKind::ConnectionError => "connection",
            ErrorKind::ProtocolError => "protocol",
            ErrorKind::RemoteError => "remote",
            ErrorKind::ExportError => "export",
            ErrorKind::TimeoutError => "timeout",
        }
    }
}

/// The classified error attached to a failed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFailure {
    pub kind: ErrorKind,
    /// Text suitable for showing to the user.
    pub message: String,
    /// Diagnostics kept for logs, never shown verbatim.
    pub detail: Option<String>,
}

impl ResearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResearchError::EmptyQuery => ErrorKind::EmptyQueryError,
            ResearchError::Connection(_) => ErrorKind::ConnectionError,
            ResearchError::Protocol { .. } => ErrorKind::ProtocolError,
            ResearchError::Remote(_) => ErrorKind::RemoteError,
            ResearchError::Export(_) => ErrorKind::ExportError,
            ResearchError::Timeout(_) => ErrorKind::TimeoutError,
        }
    }

    /// `EmptyQuery` is rejected before a session exists and `Export` runs
    /// beside the session, so neither ends one.
    pub fn terminates_session(&self) -> bool {
        !matches!(self, ResearchError::EmptyQuery | ResearchError::Export(_))
    }

    pub fn protocol(reason: impl Into<String>, raw: &str) -> Self {
        ResearchError::Protocol {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

pub fn classify(error: &ResearchError) -> SessionFailure {
    let kind = error.kind();
    let (message, detail) = match error {
        ResearchError::EmptyQuery => ("Please enter a research question.".to_string(), None),
        ResearchError::Connection(reason) => (
            "Could not reach the research service. Check that it is running and reachable."
                .to_string(),
            Some(reason.clone()),
        ),
        ResearchError::Protocol { reason, raw } => (
            "The research service sent an update this client could not read.".to_string(),
            Some(format!("{reason}; raw frame: {raw}")),
        ),
        ResearchError::Remote(content) => (content.clone(), None),
        ResearchError::Export(detail) => (format!("Export failed: {detail}"), None),
        ResearchError::Timeout(after) => (
            format!(
                "The research service stopped responding (no update for {}s).",
                after.as_secs()
            ),
            None,
        ),
    };
    SessionFailure {
        kind,
        message,
        detail,
    }
}

/// Rejections of controller calls. None of these touch the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error(transparent)]
    Rejected(#[from] ResearchError),

    #[error("cannot {operation} while the session is {}", state.as_str())]
    IllegalTransition {
        operation: &'static str,
        state: SessionState,
    },
}
