use anyhow::Context;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const OBS_TARGET: &str = "papersio.obs";
const LOG_PREFIX: &str = "papersio.cli";
const LOG_SUFFIX: &str = "jsonl";
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub logs_dir: String,
    pub prefix: String,
    pub retention_days: u64,
    pub pruned_files: usize,
    pub initialized_at: DateTime<Utc>,
}

/// A structured lifecycle record. Empty optional fields are logged as `""`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObservabilityEvent<'a> {
    pub event: &'a str,
    pub component: &'a str,
    pub session_id: Option<&'a str>,
    pub epoch: Option<u64>,
    pub stage: Option<&'a str>,
    pub status: Option<&'a str>,
    pub error_code: Option<&'a str>,
    pub detail: Option<&'a str>,
}

pub fn redact_text(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!(
        "[redacted len={} hash={}]",
        trimmed.len(),
        short_hash(trimmed)
    )
}

pub fn short_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub fn emit_event(level: Level, event: ObservabilityEvent<'_>) {
    let epoch = event.epoch.unwrap_or(0);
    match level {
        Level::ERROR => tracing::error!(
            target: OBS_TARGET,
            component = event.component,
            event = event.event,
            session_id = event.session_id.unwrap_or(""),
            epoch,
            stage = event.stage.unwrap_or(""),
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
        Level::WARN => tracing::warn!(
            target: OBS_TARGET,
            component = event.component,
            event = event.event,
            session_id = event.session_id.unwrap_or(""),
            epoch,
            stage = event.stage.unwrap_or(""),
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
        Level::DEBUG | Level::TRACE => tracing::debug!(
            target: OBS_TARGET,
            component = event.component,
            event = event.event,
            session_id = event.session_id.unwrap_or(""),
            epoch,
            stage = event.stage.unwrap_or(""),
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
        _ => tracing::info!(
            target: OBS_TARGET,
            component = event.component,
            event = event.event,
            session_id = event.session_id.unwrap_or(""),
            epoch,
            stage = event.stage.unwrap_or(""),
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
    }
}

/// Installs a compact stderr layer plus a daily rolling JSONL file under
/// `logs_dir`, after pruning rotated files older than `retention_days`.
/// The returned guard must be held for the life of the process.
pub fn init_process_logging(
    logs_dir: &Path,
    retention_days: u64,
) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("creating log directory {}", logs_dir.display()))?;
    let pruned_files = prune_expired_logs(logs_dir, retention_days, Utc::now().date_naive())?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix(LOG_SUFFIX)
        .build(logs_dir)
        .context("building the JSONL log appender")?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init();
    if installed.is_err() {
        tracing::debug!("a global subscriber is already set; keeping it");
    }

    Ok((
        guard,
        LoggingInitInfo {
            logs_dir: logs_dir.display().to_string(),
            prefix: LOG_PREFIX.to_string(),
            retention_days,
            pruned_files,
            initialized_at: Utc::now(),
        },
    ))
}

/// Date stamp of a rotated file such as `papersio.cli.2024-05-01.jsonl`.
fn rotated_log_date(file_name: &str) -> Option<NaiveDate> {
    let stamp = file_name
        .strip_prefix(LOG_PREFIX)?
        .strip_prefix('.')?
        .strip_suffix(LOG_SUFFIX)?
        .strip_suffix('.')?;
    NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok()
}

/// Removes rotated files dated before `today - retention_days`. Files that are
/// not ours are left alone. Returns how many were removed.
fn prune_expired_logs(
    logs_dir: &Path,
    retention_days: u64,
    today: NaiveDate,
) -> anyhow::Result<usize> {
    let cutoff = today
        .checked_sub_days(Days::new(retention_days))
        .unwrap_or(NaiveDate::MIN);
    let expired: Vec<PathBuf> = fs::read_dir(logs_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(rotated_log_date)
                .is_some_and(|date| date < cutoff)
        })
        .collect();

    Ok(expired
        .iter()
        .filter(|path| fs::remove_file(path).is_ok())
        .count())
}

pub fn canonical_logs_dir_from_root(root: &Path) -> PathBuf {
    root.join("logs")
}
