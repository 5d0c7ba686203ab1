//! Escalation Scheduler
//!
//! Owns one [`Campaign`] task per ongoing downtime plus the one-off update
//! and acknowledgement rounds. All tasks are tracked so the host can drain
//! or shut down without losing in-flight sends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::EscalationConfig;
use crate::events::EngineEvent;
use crate::recipients::RecipientResolver;
use crate::types::{
    AlertAttempt, AttemptKind, Downtime, DowntimeId, EventType, Network, ResolvedRecipient,
};

use super::campaign::{Campaign, CampaignCommand, CampaignHandle, CampaignRegistry};
use super::round::{run_round, RoundContext, RoundSpec};
use super::sequencer::{LevelSequencer, SharedSequencer};

/// Commands a campaign may have queued
const COMMAND_BUFFER: usize = 16;

/// Result of routing an acknowledgement to a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The attempt is now Responded and the campaign has stopped
    Acknowledged,
    /// The campaign could not record it
    Rejected,
    /// No campaign is running for the downtime
    NoCampaign,
}

/// Extra content for a one-off update round
#[derive(Debug, Clone, Default)]
pub struct UpdateRound {
    pub responder: Option<String>,
    pub in_reply_to: Option<String>,
    /// Send only to these recipients instead of re-resolving
    pub recipients: Option<Vec<ResolvedRecipient>>,
}

pub struct EscalationScheduler {
    config: EscalationConfig,
    ctx: RoundContext,
    resolver: RecipientResolver,
    campaigns: CampaignRegistry,
    sequencers: Arc<Mutex<HashMap<DowntimeId, SharedSequencer>>>,
    campaign_tracker: TaskTracker,
    dispatch_tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl EscalationScheduler {
    pub fn new(config: EscalationConfig, ctx: RoundContext, resolver: RecipientResolver) -> Self {
        Self {
            config,
            ctx,
            resolver,
            campaigns: Arc::new(Mutex::new(HashMap::new())),
            sequencers: Arc::new(Mutex::new(HashMap::new())),
            campaign_tracker: TaskTracker::new(),
            dispatch_tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start escalating for an ongoing downtime.
    ///
    /// Idempotent: a second call for the same downtime is a no-op. When the
    /// store already holds alert attempts for the downtime, numbering
    /// continues from them and the next round waits out the remaining
    /// backoff.
    pub async fn start(&self, network: &Network, downtime: &Downtime) -> bool {
        if self.shutdown.is_cancelled() {
            warn!(downtime_id = %downtime.id, "Engine shutting down; campaign not started");
            return false;
        }
        if self.is_active(&downtime.id) {
            debug!(downtime_id = %downtime.id, "Campaign already running");
            return false;
        }

        let history = self.load_history(&downtime.id).await;
        let sequencer = self.sequencer_seeded(&downtime.id, &history);
        let rounds = sequencer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .max_level(AttemptKind::Alert);
        let first_fire = self.first_fire(rounds, &history);

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel = self.shutdown.child_token();
        {
            let mut campaigns = self
                .campaigns
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if campaigns.contains_key(&downtime.id) {
                return false;
            }
            campaigns.insert(
                downtime.id.clone(),
                CampaignHandle {
                    cancel: cancel.clone(),
                    commands: tx,
                },
            );
        }

        let campaign = Campaign {
            network: network.clone(),
            downtime: downtime.clone(),
            ctx: self.ctx.clone(),
            resolver: self.resolver.clone(),
            sequencer,
            config: self.config.clone(),
            cancel,
            shutdown: self.shutdown.clone(),
            commands: rx,
            registry: self.campaigns.clone(),
            rounds,
            first_fire,
        };

        self.ctx.events.publish(EngineEvent::CampaignStarted {
            network_id: network.id.clone(),
            downtime_id: downtime.id.clone(),
            timestamp: Utc::now(),
        });
        self.campaign_tracker.spawn(campaign.run());
        true
    }

    /// Stop the campaign for a downtime. Returns false if none was running.
    pub fn terminate(&self, downtime_id: &str) -> bool {
        let handle = self
            .campaigns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(downtime_id)
            .cloned();
        match handle {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Ask the downtime's campaign to record an acknowledgement.
    pub async fn acknowledge(
        &self,
        downtime_id: &str,
        attempt_id: &str,
        at: chrono::DateTime<Utc>,
    ) -> AckOutcome {
        let handle = self
            .campaigns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(downtime_id)
            .cloned();
        let Some(handle) = handle else {
            return AckOutcome::NoCampaign;
        };

        let (reply, response) = oneshot::channel();
        let command = CampaignCommand::Acknowledge {
            attempt_id: attempt_id.to_string(),
            at,
            reply,
        };
        if handle.commands.send(command).await.is_err() {
            // The campaign exited between lookup and send
            return AckOutcome::NoCampaign;
        }
        match response.await {
            Ok(true) => AckOutcome::Acknowledged,
            Ok(false) => AckOutcome::Rejected,
            Err(_) => AckOutcome::NoCampaign,
        }
    }

    pub fn is_active(&self, downtime_id: &str) -> bool {
        self.campaigns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(downtime_id)
    }

    pub fn active_count(&self) -> usize {
        self.campaigns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Sequencer for a downtime, seeded from the store on first use.
    pub async fn sequencer_for(&self, downtime_id: &str) -> SharedSequencer {
        let existing = self
            .sequencers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(downtime_id)
            .cloned();
        if let Some(existing) = existing {
            return existing;
        }
        let history = self.load_history(downtime_id).await;
        self.sequencer_seeded(downtime_id, &history)
    }

    /// Send a one-off Update or Response round on a tracked task.
    pub async fn spawn_round(
        &self,
        network: &Network,
        downtime: &Downtime,
        kind: AttemptKind,
        event_type: EventType,
        round: UpdateRound,
    ) {
        let sequencer = self.sequencer_for(&downtime.id).await;
        let ctx = self.ctx.clone();
        let resolver = self.resolver.clone();
        let network = network.clone();
        let downtime = downtime.clone();

        self.dispatch_tracker.spawn(async move {
            let recipients = match round.recipients {
                Some(recipients) => recipients,
                None => match resolver.resolve(&network.id).await {
                    Ok(recipients) => recipients,
                    Err(e) => {
                        warn!(
                            downtime_id = %downtime.id,
                            %kind,
                            "Recipient resolution failed, {} not sent: {}",
                            event_type,
                            e
                        );
                        return;
                    }
                },
            };
            let attempts = run_round(
                &ctx,
                RoundSpec {
                    network: &network,
                    downtime: &downtime,
                    kind,
                    event_type,
                    recipients: &recipients,
                    sequencer: &sequencer,
                    responder: round.responder.as_deref(),
                    in_reply_to: round.in_reply_to.as_deref(),
                },
            )
            .await;
            debug!(
                downtime_id = %downtime.id,
                %kind,
                %event_type,
                attempts = attempts.len(),
                "One-off round dispatched"
            );
        });
    }

    /// Forget the sequencer of a downtime that will send nothing more.
    pub fn release(&self, downtime_id: &str) {
        self.sequencers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(downtime_id);
    }

    /// Wait until every one-off round spawned so far has finished.
    ///
    /// Campaigns keep running.
    pub async fn drain(&self) {
        self.dispatch_tracker.close();
        self.dispatch_tracker.wait().await;
        self.dispatch_tracker.reopen();
    }

    /// Cancel all campaigns and wait for every task to finish.
    ///
    /// Rounds already in flight complete and are recorded.
    pub async fn shutdown(&self) {
        info!(active = self.active_count(), "Shutting down escalation scheduler");
        self.shutdown.cancel();
        self.campaign_tracker.close();
        self.dispatch_tracker.close();
        self.campaign_tracker.wait().await;
        self.dispatch_tracker.wait().await;
    }

    async fn load_history(&self, downtime_id: &str) -> Vec<AlertAttempt> {
        match self.ctx.store.attempts_for_downtime(downtime_id).await {
            Ok(attempts) => attempts,
            Err(e) => {
                warn!(%downtime_id, "Could not load attempt history, numbering from 1: {}", e);
                Vec::new()
            }
        }
    }

    fn sequencer_seeded(&self, downtime_id: &str, history: &[AlertAttempt]) -> SharedSequencer {
        self.sequencers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(downtime_id.to_string())
            .or_insert_with(|| LevelSequencer::from_attempts(history).shared())
            .clone()
    }

    /// Fire now, or after the remaining backoff when resuming.
    fn first_fire(&self, rounds: u32, history: &[AlertAttempt]) -> Instant {
        let now = Instant::now();
        if rounds == 0 {
            return now;
        }
        let last_alert = history
            .iter()
            .filter(|a| a.kind == AttemptKind::Alert)
            .map(|a| a.created_at)
            .max();
        let Some(last_alert) = last_alert else {
            return now;
        };
        let elapsed = (Utc::now() - last_alert).to_std().unwrap_or(Duration::ZERO);
        let remaining = self.config.backoff.delay(rounds).saturating_sub(elapsed);
        now + remaining
    }
}
