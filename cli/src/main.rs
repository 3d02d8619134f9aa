mod render;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use papersio_client::ResearchApiClient;
use papersio_observability::{
    canonical_logs_dir_from_root, emit_event, init_process_logging, ObservabilityEvent,
};
use papersio_session::config::idle_timeout_from_secs;
use papersio_session::{
    classify, ClientConfig, ResearchResponse, SessionController, SessionOptions, TerminalKind,
    WebSocketTransport,
};
use papersio_wire::{CitationStyle, ResearchMode};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::render::ProgressPrinter;

const LOG_RETENTION_DAYS: u64 = 14;

#[derive(Parser, Debug)]
#[command(name = "papersio")]
#[command(about = "Run live research sessions against a Papersio service")]
struct Cli {
    /// Directory for JSONL logs. Defaults to the platform data dir.
    #[arg(long, global = true)]
    logs_dir: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a query and follow it until it finishes.
    Research {
        query: String,
        #[arg(long, default_value_t = false)]
        no_search: bool,
        /// `ultra` or `standard`.
        #[arg(long)]
        mode: Option<String>,
        #[arg(long, env = "PAPERSIO_WS_URL")]
        ws_url: Option<String>,
        #[arg(long, env = "PAPERSIO_API_URL")]
        api_url: Option<String>,
        /// Fail the session after this many silent seconds. 0 disables.
        #[arg(long)]
        idle_timeout_secs: Option<u64>,
        /// Write the finished report as a PDF to this path.
        #[arg(long)]
        export: Option<PathBuf>,
        #[arg(long, default_value = "IEEE")]
        citation_style: String,
    },
    /// Show what the service has stored so far.
    Stats {
        #[arg(long, env = "PAPERSIO_API_URL")]
        api_url: Option<String>,
    },
    /// Check that the service is up.
    Health {
        #[arg(long, env = "PAPERSIO_API_URL")]
        api_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logs_dir = resolve_logs_dir(cli.logs_dir.as_deref());
    let (_log_guard, log_info) = init_process_logging(&logs_dir, LOG_RETENTION_DAYS)?;
    emit_event(
        tracing::Level::INFO,
        ObservabilityEvent {
            event: "logging.initialized",
            component: "cli.main",
            status: Some("ok"),
            detail: Some("cli jsonl logging initialized"),
            ..ObservabilityEvent::default()
        },
    );
    info!("cli logging initialized: {:?}", log_info);

    let mut config = ClientConfig::from_env();

    match cli.command {
        Command::Research {
            query,
            no_search,
            mode,
            ws_url,
            api_url,
            idle_timeout_secs,
            export,
            citation_style,
        } => {
            if no_search {
                config.use_search = false;
            }
            if let Some(mode) = mode {
                config.mode = ResearchMode::parse(&mode)
                    .with_context(|| format!("unknown research mode `{mode}`"))?;
            }
            if let Some(url) = ws_url {
                config.ws_url = url;
            }
            if let Some(url) = api_url {
                config.api_base_url = url;
            }
            if let Some(secs) = idle_timeout_secs {
                config.idle_timeout = idle_timeout_from_secs(secs);
            }
            let export = match export {
                Some(path) => {
                    let style = CitationStyle::parse(&citation_style).with_context(|| {
                        format!("unknown citation style `{citation_style}`")
                    })?;
                    Some((path, style))
                }
                None => None,
            };

            let response = run_research(&config, &query).await?;
            println!("{}", render::report(&response));

            if let Some((path, style)) = export {
                export_pdf(&config, &response, style, &path).await?;
            }
        }
        Command::Stats { api_url } => {
            let client = ResearchApiClient::new(api_url.unwrap_or(config.api_base_url));
            let stats = client.stats().await?;
            let db = &stats.database;
            println!("queries:            {}", db.total_queries);
            println!("results:            {}", db.total_results);
            println!("papers:             {}", db.total_papers);
            println!("papers (full text): {}", db.papers_with_full_text);
            if !stats.vectors.is_null() {
                println!("vectors:            {}", stats.vectors);
            }
            if !stats.message.is_empty() {
                println!("{}", stats.message);
            }
        }
        Command::Health { api_url } => {
            let client = ResearchApiClient::new(api_url.unwrap_or(config.api_base_url));
            let health = client.check_health().await?;
            println!(
                "{} {}",
                health.status,
                health.version.as_deref().unwrap_or("(unknown version)")
            );
            if let Some(message) = health.message {
                println!("{message}");
            }
        }
    }

    Ok(())
}

async fn run_research(config: &ClientConfig, query: &str) -> anyhow::Result<ResearchResponse> {
    let transport = WebSocketTransport::new(config.ws_url.clone());
    let mut controller = SessionController::new(transport, SessionOptions::from(config));
    info!("connecting to {}", controller.endpoint());

    let mut updates = controller.subscribe();
    let printer = tokio::spawn(async move {
        let mut printer = ProgressPrinter::default();
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if let Some(line) = printer.line_for(&snapshot) {
                eprintln!("{line}");
            }
            if snapshot.is_terminated() {
                break;
            }
        }
    });

    controller.start(query)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let session = controller.drive(&cancel).await;
    drop(controller);
    let _ = printer.await;

    match session.terminal_kind {
        TerminalKind::Completed => session
            .result
            .context("session completed without a response"),
        TerminalKind::Failed => {
            let failure = session
                .error
                .context("session failed without a recorded error")?;
            anyhow::bail!("{} ({})", failure.message, failure.kind.code())
        }
        TerminalKind::Cancelled => anyhow::bail!("research cancelled"),
        TerminalKind::None => anyhow::bail!("session ended in state {}", session.state.as_str()),
    }
}

async fn export_pdf(
    config: &ClientConfig,
    response: &ResearchResponse,
    style: CitationStyle,
    path: &Path,
) -> anyhow::Result<()> {
    let client = ResearchApiClient::new(config.api_base_url.clone());
    let bytes = match client.export_pdf(response, style, None).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let failure = classify(&err);
            anyhow::bail!("export failed: {}", failure.message);
        }
    };
    tokio::fs::write(path, &bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    eprintln!("saved {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn resolve_logs_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(dir) = explicit {
        return PathBuf::from(dir);
    }
    let root = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("papersio");
    canonical_logs_dir_from_root(&root)
}
