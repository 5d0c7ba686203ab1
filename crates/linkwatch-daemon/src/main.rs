use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use linkwatch_daemon::config::DaemonConfig;
use linkwatch_daemon::input::{self, FeedStats};
use linkwatch_daemon::build_engine;
use linkwatch_engine::Engine;
use tokio::io::BufReader;
use tracing::{info, warn};

/// Watch link health and escalate outages until someone answers.
#[derive(Debug, Parser)]
#[command(name = "linkwatch", version)]
struct Cli {
    /// Directory, gateway and engine settings (TOML)
    #[arg(short, long, default_value = "linkwatch.toml")]
    config: PathBuf,

    /// JSON-lines feed of samples and replies; stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Stop once the feed is exhausted instead of escalating until Ctrl-C
    #[arg(long)]
    exit_on_eof: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = DaemonConfig::load(&cli.config)?;
    let engine = build_engine(&config)?;
    info!(
        config = %cli.config.display(),
        backoff = ?config.engine.escalation.backoff,
        "Linkwatch starting"
    );

    let feed = run_input(&engine, cli.input.as_deref());

    tokio::select! {
        stats = feed => {
            let stats = stats?;
            info!(
                lines = stats.lines,
                applied = stats.applied,
                failed = stats.failed,
                "Feed exhausted"
            );
            if !cli.exit_on_eof {
                info!(active = engine.active_campaigns(), "Escalating until interrupted");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to wait for Ctrl-C: {e}");
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    engine.drain().await;
    engine.shutdown().await;
    info!("Linkwatch stopped");
    Ok(())
}

async fn run_input(engine: &Engine, path: Option<&Path>) -> Result<FeedStats> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open feed {}", path.display()))?;
            input::run_feed(engine, BufReader::new(file)).await
        }
        None => input::run_feed(engine, BufReader::new(tokio::io::stdin())).await,
    }
}
