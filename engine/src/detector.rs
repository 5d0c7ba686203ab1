//! Status Transition Detector
//!
//! Folds raw samples into a network's stored status and reports a
//! [`Transition`] only when the resolved status actually changes.
//!
//! ```text
//! sample ──▶ stale? ──yes──▶ ignored
//!              │no
//!              ▼
//!           resolve status (latency threshold)
//!              │
//!              ▼
//!           same as stored? ──yes──▶ update latency/timestamp, no transition
//!              │no
//!              ▼
//!           Transition { from, to, at }
//! ```
//!
//! The caller holds the per-network lock, so `observe` needs no
//! synchronisation of its own.

use tracing::debug;

use crate::config::DetectorConfig;
use crate::types::{LinkSample, LinkStatus, Network, Transition};

/// Stateless detector; all per-network state lives in the [`Network`] passed in.
#[derive(Debug, Clone, Default)]
pub struct StatusDetector {
    config: DetectorConfig,
}

impl StatusDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Effective status of a sample after applying the latency threshold.
    pub fn resolve_status(&self, sample: &LinkSample) -> LinkStatus {
        match (sample.status, self.config.intermittent_latency_ms, sample.latency_ms) {
            (LinkStatus::Up, Some(threshold), Some(latency)) if latency > threshold => {
                LinkStatus::Intermittent
            }
            (status, _, _) => status,
        }
    }

    /// Apply `sample` to `network`.
    ///
    /// Samples not strictly newer than `network.last_update` leave the
    /// network untouched and return `None`.
    pub fn observe(&self, network: &mut Network, sample: &LinkSample) -> Option<Transition> {
        if let Some(last) = network.last_update {
            if sample.observed_at <= last {
                debug!(
                    network_id = %network.id,
                    observed_at = %sample.observed_at,
                    last_update = %last,
                    "Ignoring stale sample"
                );
                return None;
            }
        }

        let resolved = self.resolve_status(sample);
        let previous = network.status;

        network.latency_ms = sample.latency_ms;
        network.last_update = Some(sample.observed_at);

        if resolved == previous {
            return None;
        }

        network.status = resolved;
        debug!(
            network_id = %network.id,
            from = %previous,
            to = %resolved,
            "Status transition"
        );
        Some(Transition {
            network_id: network.id.clone(),
            from: previous,
            to: resolved,
            at: sample.observed_at,
            latency_ms: sample.latency_ms,
        })
    }
}
