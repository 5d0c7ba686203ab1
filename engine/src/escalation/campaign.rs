//! The per-downtime escalation task
//!
//! A campaign fires an alert round, sleeps for the backoff delay, and fires
//! again until it is cancelled or a recipient acknowledges. Acknowledgements
//! arrive as [`CampaignCommand`]s and are handled between rounds, so no
//! round can start after an attempt has been marked `Responded`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EscalationConfig;
use crate::events::{EngineEvent, TerminationReason};
use crate::recipients::RecipientResolver;
use crate::types::{AttemptId, AttemptKind, DeliveryStatus, Downtime, DowntimeId, Network};

use super::round::{run_round, RoundContext, RoundSpec};
use super::sequencer::SharedSequencer;

/// Messages accepted by a running campaign
#[derive(Debug)]
pub enum CampaignCommand {
    /// Mark `attempt_id` as Responded and stop escalating.
    ///
    /// `reply` receives `true` once the attempt is recorded as Responded.
    Acknowledge {
        attempt_id: AttemptId,
        at: DateTime<Utc>,
        reply: oneshot::Sender<bool>,
    },
}

/// Scheduler-side handle to a running campaign
#[derive(Clone)]
pub struct CampaignHandle {
    pub cancel: CancellationToken,
    pub commands: mpsc::Sender<CampaignCommand>,
}

/// Running campaigns keyed by downtime
pub type CampaignRegistry = Arc<Mutex<HashMap<DowntimeId, CampaignHandle>>>;

pub(crate) struct Campaign {
    pub network: Network,
    pub downtime: Downtime,
    pub ctx: RoundContext,
    pub resolver: RecipientResolver,
    pub sequencer: SharedSequencer,
    pub config: EscalationConfig,
    /// Cancelled on terminate; child of `shutdown`
    pub cancel: CancellationToken,
    pub shutdown: CancellationToken,
    pub commands: mpsc::Receiver<CampaignCommand>,
    pub registry: CampaignRegistry,
    /// Rounds already fired, non-zero when resuming
    pub rounds: u32,
    pub first_fire: Instant,
}

impl Campaign {
    pub(crate) async fn run(mut self) {
        info!(
            network_id = %self.network.id,
            downtime_id = %self.downtime.id,
            resumed_at_round = self.rounds,
            "Escalation campaign running"
        );
        let reason = self.drive().await;
        self.finish(reason);
    }

    async fn drive(&mut self) -> TerminationReason {
        let mut wake = Some(self.first_fire);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return self.cancel_reason(),

                command = self.commands.recv() => match command {
                    Some(CampaignCommand::Acknowledge { attempt_id, at, reply }) => {
                        let recorded = self.acknowledge(&attempt_id, at).await;
                        let _ = reply.send(recorded);
                        if recorded {
                            return TerminationReason::Responded;
                        }
                    }
                    None => return TerminationReason::Shutdown,
                },

                _ = tokio::time::sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                    self.fire().await;
                    wake = self.next_wake();
                }
            }
        }
    }

    fn cancel_reason(&self) -> TerminationReason {
        if self.shutdown.is_cancelled() {
            TerminationReason::Shutdown
        } else {
            TerminationReason::Resolved
        }
    }

    /// `None` once `max_level` rounds have fired.
    fn next_wake(&self) -> Option<Instant> {
        if let Some(max) = self.config.max_level {
            if self.rounds >= max {
                info!(
                    downtime_id = %self.downtime.id,
                    max_level = max,
                    "Maximum escalation level reached; waiting for resolution"
                );
                return None;
            }
        }
        Some(Instant::now() + self.config.backoff.delay(self.rounds))
    }

    async fn fire(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.rounds += 1;

        let recipients = match self.resolver.resolve(&self.network.id).await {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(
                    downtime_id = %self.downtime.id,
                    round = self.rounds,
                    "Recipient resolution failed, skipping round: {}",
                    e
                );
                return;
            }
        };

        let attempts = run_round(
            &self.ctx,
            RoundSpec {
                network: &self.network,
                downtime: &self.downtime,
                kind: AttemptKind::Alert,
                event_type: self.downtime.alert_event_type(),
                recipients: &recipients,
                sequencer: &self.sequencer,
                responder: None,
                in_reply_to: None,
            },
        )
        .await;

        if attempts.is_empty() {
            debug!(downtime_id = %self.downtime.id, round = self.rounds, "Round had no recipients");
            return;
        }

        let level = attempts.iter().map(|a| a.level).max().unwrap_or(0);
        info!(
            downtime_id = %self.downtime.id,
            level,
            recipients = attempts.len(),
            "Escalation level fired"
        );
        self.ctx.events.publish(EngineEvent::LevelFired {
            network_id: self.network.id.clone(),
            downtime_id: self.downtime.id.clone(),
            level,
            recipients: attempts.len(),
            timestamp: Utc::now(),
        });
    }

    async fn acknowledge(&self, attempt_id: &str, at: DateTime<Utc>) -> bool {
        match self
            .ctx
            .store
            .update_alert_attempt_status(attempt_id, DeliveryStatus::Responded, at)
            .await
        {
            Ok(()) => {
                info!(downtime_id = %self.downtime.id, %attempt_id, "Alert acknowledged");
                true
            }
            Err(e) => {
                warn!(
                    downtime_id = %self.downtime.id,
                    %attempt_id,
                    "Failed to record acknowledgement: {}",
                    e
                );
                false
            }
        }
    }

    fn last_level(&self) -> u32 {
        let sequencer = self
            .sequencer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sequencer.max_level(AttemptKind::Alert)
    }

    fn finish(self, reason: TerminationReason) {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.downtime.id);

        let last_level = self.last_level();
        info!(
            network_id = %self.network.id,
            downtime_id = %self.downtime.id,
            %reason,
            last_level,
            "Escalation campaign terminated"
        );
        self.ctx.events.publish(EngineEvent::CampaignTerminated {
            network_id: self.network.id.clone(),
            downtime_id: self.downtime.id.clone(),
            reason,
            last_level,
            timestamp: Utc::now(),
        });
    }
}
