//! JSON-lines event feed
//!
//! One command per line:
//!
//! ```text
//! {"type":"sample","network_id":"n1","status":"down","observed_at":"2026-03-01T08:00:00Z"}
//! {"type":"reply","channel":"chat","reference":"wamid-77"}
//! {"type":"resolve","network_id":"n1"}
//! {"type":"update","downtime_id":"...","ticket_number":"INC-1","actor":"noc"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. A malformed line
//! is logged and skipped; it never stops the feed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use linkwatch_engine::{
    Channel, DowntimeCategory, DowntimeUpdate, Engine, LinkSample, LinkStatus, UpdateContext,
};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedCommand {
    Sample {
        network_id: String,
        status: LinkStatus,
        #[serde(default)]
        latency_ms: Option<u32>,
        observed_at: DateTime<Utc>,
    },
    Reply {
        channel: Channel,
        reference: String,
        #[serde(default)]
        received_at: Option<DateTime<Utc>>,
    },
    Resolve {
        network_id: String,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    Update {
        downtime_id: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        ticket_number: Option<String>,
        #[serde(default)]
        category: Option<DowntimeCategory>,
        #[serde(default)]
        subcategory: Option<String>,
        #[serde(default)]
        actor: Option<String>,
    },
}

/// Parse one feed line; `None` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<FeedCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let command = serde_json::from_str(line).context("Malformed feed line")?;
    Ok(Some(command))
}

/// Counters for a processed feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Apply a single command to the engine.
pub async fn apply(engine: &Engine, command: FeedCommand) -> Result<()> {
    match command {
        FeedCommand::Sample {
            network_id,
            status,
            latency_ms,
            observed_at,
        } => {
            let sample = LinkSample::new(network_id, status, latency_ms, observed_at);
            if let Some(transition) = engine.ingest(&sample).await? {
                info!(
                    network_id = %transition.network_id,
                    from = %transition.from,
                    to = %transition.to,
                    "Link status changed"
                );
            }
        }
        FeedCommand::Reply {
            channel,
            reference,
            received_at,
        } => {
            let at = received_at.unwrap_or_else(Utc::now);
            let acknowledged = engine.on_inbound_reply(channel, &reference, at).await?;
            debug!(%channel, %reference, acknowledged, "Reply processed");
        }
        FeedCommand::Resolve { network_id, at } => {
            let outcome = engine
                .resolve_downtime(&network_id, at.unwrap_or_else(Utc::now))
                .await?;
            debug!(%network_id, ?outcome, "Manual resolve processed");
        }
        FeedCommand::Update {
            downtime_id,
            description,
            ticket_number,
            category,
            subcategory,
            actor,
        } => {
            let update = DowntimeUpdate {
                description,
                ticket_number,
                category,
                subcategory,
            };
            let applied = engine
                .update_downtime(&downtime_id, update, UpdateContext { actor })
                .await?;
            debug!(%downtime_id, applied, "Downtime update processed");
        }
    }
    Ok(())
}

/// Read and apply commands until EOF.
pub async fn run_feed<R>(engine: &Engine, reader: R) -> Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = FeedStats::default();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read feed")? {
        stats.lines += 1;
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => {
                stats.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(line = stats.lines, "Skipping feed line: {:#}", e);
                stats.failed += 1;
                continue;
            }
        };
        match apply(engine, command).await {
            Ok(()) => stats.applied += 1,
            Err(e) => {
                warn!(line = stats.lines, "Feed command failed: {:#}", e);
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}
