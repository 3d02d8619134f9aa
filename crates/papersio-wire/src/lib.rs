use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FRAME_TYPE_STATUS: &str = "status";
pub const FRAME_TYPE_RESULT: &str = "result";
pub const FRAME_TYPE_ERROR: &str = "error";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResearchMode {
    #[default]
    Ultra,
    Standard,
}

impl ResearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResearchMode::Ultra => "ultra",
            ResearchMode::Standard => "standard",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ultra" => Some(ResearchMode::Ultra),
            "standard" => Some(ResearchMode::Standard),
            _ => None,
        }
    }
}

/// The single frame a client sends after the channel opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResearchRequest {
    pub query: String,
    pub use_search: bool,
    pub mode: ResearchMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WireSourceType {
    Arxiv,
    Web,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireSource {
    pub title: String,
    pub url: String,
    pub source_type: WireSourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusFrame {
    pub stage: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultFrame {
    pub answer: String,
    #[serde(default)]
    pub sources: Option<Vec<WireSource>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    #[serde(alias = "message")]
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CitationStyle {
    #[default]
    #[serde(rename = "IEEE")]
    Ieee,
    #[serde(rename = "APA")]
    Apa,
    #[serde(rename = "ACM")]
    Acm,
    #[serde(rename = "Nature")]
    Nature,
}

impl CitationStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            CitationStyle::Ieee => "IEEE",
            CitationStyle::Apa => "APA",
            CitationStyle::Acm => "ACM",
            CitationStyle::Nature => "Nature",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ieee" => Some(CitationStyle::Ieee),
            "apa" => Some(CitationStyle::Apa),
            "acm" => Some(CitationStyle::Acm),
            "nature" => Some(CitationStyle::Nature),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub query: String,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<WireSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_assessment: Option<Value>,
}

/// Error payload returned by the HTTP collaborators.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseStats {
    #[serde(default)]
    pub total_queries: u64,
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub total_papers: u64,
    #[serde(default)]
    pub papers_with_full_text: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub database: DatabaseStats,
    #[serde(default)]
    pub vectors: Value,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}
