use std::time::Duration;

use papersio_wire::ResearchMode;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub ws_url: String,
    pub api_base_url: String,
    pub use_search: bool,
    pub mode: ResearchMode,
    /// Fail a live session when no channel event arrives for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_base_url: DEFAULT_API_URL.to_string(),
            use_search: true,
            mode: ResearchMode::Ultra,
            idle_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Build from `PAPERSIO_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ws_url = non_blank("PAPERSIO_WS_URL").unwrap_or(defaults.ws_url);
        let api_base_url = non_blank("PAPERSIO_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);
        let use_search = non_blank("PAPERSIO_USE_SEARCH")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.use_search);
        let mode = non_blank("PAPERSIO_MODE")
            .and_then(|v| ResearchMode::parse(&v))
            .unwrap_or(defaults.mode);
        let idle_timeout = non_blank("PAPERSIO_IDLE_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .and_then(idle_timeout_from_secs);

        Self {
            ws_url,
            api_base_url,
            use_search,
            mode,
            idle_timeout,
        }
    }
}

/// Zero disables the timeout.
pub fn idle_timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
