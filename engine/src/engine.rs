//! Engine façade
//!
//! Wires detector, lifecycle, scheduler and correlator around a per-network
//! slot arena. Each network's slot sits behind its own async mutex, so
//! samples for one network apply one at a time while different networks
//! proceed in parallel. Ingestion never waits on dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::correlator::{Correlation, ResponseCorrelator};
use crate::detector::StatusDetector;
use crate::dispatch::Dispatcher;
use crate::error::{EngineError, EngineResult};
use crate::escalation::{EscalationScheduler, RoundContext, UpdateRound};
use crate::events::{EngineEvent, EventBus, SharedEventBus};
use crate::lifecycle::{DowntimeLifecycle, DowntimeSlot, LifecycleOutcome};
use crate::ports::{SharedReferenceData, SharedStore};
use crate::recipients::RecipientResolver;
use crate::types::{
    AttemptKind, Channel, DeliveryStatus, Downtime, DowntimeCategory, EventType, LinkSample,
    Network, NetworkId, Transition,
};

/// Operator enrichment of an ongoing downtime. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DowntimeUpdate {
    pub description: Option<String>,
    pub ticket_number: Option<String>,
    pub category: Option<DowntimeCategory>,
    pub subcategory: Option<String>,
}

impl DowntimeUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.ticket_number.is_none()
            && self.category.is_none()
            && self.subcategory.is_none()
    }
}

/// Who is making a change, for audit
#[derive(Debug, Clone, Default)]
pub struct UpdateContext {
    pub actor: Option<String>,
}

impl UpdateContext {
    pub fn actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
        }
    }
}

/// Everything the engine knows about one network
struct NetworkSlot {
    network: Network,
    downtime: DowntimeSlot,
}

type SlotArena = StdMutex<HashMap<NetworkId, Arc<Mutex<NetworkSlot>>>>;

pub struct Engine {
    detector: StatusDetector,
    lifecycle: DowntimeLifecycle,
    store: SharedStore,
    reference: SharedReferenceData,
    scheduler: Arc<EscalationScheduler>,
    correlator: ResponseCorrelator,
    events: SharedEventBus,
    slots: SlotArena,
}

impl Engine {
    /// Build an engine; fails only on invalid configuration.
    pub fn new(
        config: EngineConfig,
        store: SharedStore,
        reference: SharedReferenceData,
        dispatcher: Dispatcher,
    ) -> EngineResult<Self> {
        config.validate()?;

        let events = EventBus::new().shared();
        let resolver = RecipientResolver::new(reference.clone());
        let ctx = RoundContext {
            store: store.clone(),
            events: events.clone(),
            dispatcher: Arc::new(dispatcher),
        };
        let scheduler = Arc::new(EscalationScheduler::new(
            config.escalation.clone(),
            ctx,
            resolver.clone(),
        ));
        let correlator =
            ResponseCorrelator::new(store.clone(), scheduler.clone(), resolver, events.clone());

        Ok(Self {
            detector: StatusDetector::new(config.detector.clone()),
            lifecycle: DowntimeLifecycle::new(config.lifecycle.clone()),
            store,
            reference,
            scheduler,
            correlator,
            events,
            slots: StdMutex::new(HashMap::new()),
        })
    }

    /// Event stream for every engine decision
    pub fn events(&self) -> SharedEventBus {
        self.events.clone()
    }

    pub fn active_campaigns(&self) -> usize {
        self.scheduler.active_count()
    }

    pub fn is_escalating(&self, downtime_id: &str) -> bool {
        self.scheduler.is_active(downtime_id)
    }

    /// Feed one health sample. Returns the transition it caused, if any.
    pub async fn ingest(&self, sample: &LinkSample) -> EngineResult<Option<Transition>> {
        let slot = self.slot(&sample.network_id).await?;
        let mut guard = slot.lock().await;

        let transition = self.detector.observe(&mut guard.network, sample);
        if guard.network.last_update == Some(sample.observed_at) {
            if let Err(e) = self.store.save_network(&guard.network).await {
                warn!(network_id = %sample.network_id, "Failed to persist network: {}", e);
            }
        }
        let Some(transition) = transition else {
            return Ok(None);
        };

        self.events.publish(EngineEvent::TransitionDetected {
            network_id: transition.network_id.clone(),
            from: transition.from,
            to: transition.to,
            timestamp: transition.at,
        });

        let outcome = self.lifecycle.apply(&mut guard.downtime, &transition);
        self.handle_outcome(&guard, outcome).await;
        Ok(Some(transition))
    }

    /// Close the network's ongoing downtime by hand at `at`.
    pub async fn resolve_downtime(
        &self,
        network_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<LifecycleOutcome> {
        let slot = self.slot(network_id).await?;
        let mut guard = slot.lock().await;
        let network_id = guard.network.id.clone();
        let outcome = self.lifecycle.resolve(&mut guard.downtime, &network_id, at);
        self.handle_outcome(&guard, outcome.clone()).await;
        Ok(outcome)
    }

    /// Enrich an ongoing downtime and notify its recipients.
    ///
    /// Returns false, changing nothing, when the downtime is already
    /// resolved or the update is empty.
    pub async fn update_downtime(
        &self,
        downtime_id: &str,
        update: DowntimeUpdate,
        ctx: UpdateContext,
    ) -> EngineResult<bool> {
        let stored = self
            .store
            .get_downtime(downtime_id)
            .await?
            .ok_or_else(|| EngineError::UnknownDowntime(downtime_id.to_string()))?;
        if update.is_empty() {
            debug!(%downtime_id, "Empty downtime update; nothing to do");
            return Ok(false);
        }

        let slot = self.slot(&stored.network_id).await?;
        let mut guard = slot.lock().await;
        let Some(downtime) = guard
            .downtime
            .ongoing_mut()
            .filter(|ongoing| ongoing.id == downtime_id)
        else {
            warn!(%downtime_id, actor = ?ctx.actor, "Update for a downtime that is not ongoing; ignoring");
            return Ok(false);
        };

        if let Some(description) = update.description {
            downtime.description = Some(description);
        }
        if let Some(ticket) = update.ticket_number {
            downtime.ticket_number = Some(ticket);
        }
        if let Some(category) = update.category {
            downtime.category = Some(category);
        }
        if let Some(subcategory) = update.subcategory {
            downtime.subcategory = Some(subcategory);
        }
        let downtime = downtime.clone();

        self.store.save_downtime(&downtime).await?;
        info!(
            network_id = %downtime.network_id,
            %downtime_id,
            actor = ?ctx.actor,
            "Downtime updated"
        );
        self.events.publish(EngineEvent::DowntimeUpdated {
            network_id: downtime.network_id.clone(),
            downtime_id: downtime.id.clone(),
            actor: ctx.actor,
            timestamp: Utc::now(),
        });
        self.scheduler
            .spawn_round(
                &guard.network,
                &downtime,
                AttemptKind::Update,
                EventType::Downtime,
                UpdateRound::default(),
            )
            .await;
        Ok(true)
    }

    /// Handle a reply on `channel` answering the message `reference`.
    ///
    /// True when it acknowledged an alert and stopped escalation.
    pub async fn on_inbound_reply(
        &self,
        channel: Channel,
        reference: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let Some(network_id) = self.correlator.network_for_reply(channel, reference).await? else {
            debug!(%channel, %reference, "Reply does not match any alert");
            return Ok(false);
        };

        // Held through the acknowledgement so the downtime cannot resolve under it
        let slot = self.slot(&network_id).await?;
        let guard = slot.lock().await;
        let correlation = self
            .correlator
            .on_inbound_reply(channel, reference, at, guard.downtime.ongoing())
            .await?;
        let (downtime, attempt, responder) = match correlation {
            Correlation::Acknowledged {
                downtime,
                attempt,
                responder,
            } => (downtime, attempt, responder),
            other => {
                debug!(%channel, %reference, outcome = ?other, "Reply not acted on");
                return Ok(false);
            }
        };

        let round = UpdateRound {
            responder: Some(responder.recipient.name.clone()),
            in_reply_to: attempt.external_id.clone(),
            recipients: Some(vec![responder]),
        };
        self.scheduler
            .spawn_round(
                &guard.network,
                &downtime,
                AttemptKind::Response,
                downtime.alert_event_type(),
                round,
            )
            .await;
        Ok(true)
    }

    /// Wait for outstanding update and acknowledgement rounds.
    pub async fn drain(&self) {
        self.scheduler.drain().await;
    }

    /// Stop every campaign and wait for in-flight sends to be recorded.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Current view of a network and its open downtime
    pub async fn snapshot(&self, network_id: &str) -> Option<(Network, Option<Downtime>)> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(network_id)
            .cloned()?;
        let guard = slot.lock().await;
        Some((guard.network.clone(), guard.downtime.ongoing().cloned()))
    }

    async fn handle_outcome(&self, slot: &NetworkSlot, outcome: LifecycleOutcome) {
        let network = &slot.network;
        match outcome {
            LifecycleOutcome::Opened(downtime) => {
                self.persist_downtime(&downtime).await;
                self.events.publish(EngineEvent::DowntimeOpened {
                    network_id: network.id.clone(),
                    downtime_id: downtime.id.clone(),
                    opened_by: downtime.opened_by,
                    timestamp: downtime.start,
                });
                self.scheduler.start(network, &downtime).await;
            }
            LifecycleOutcome::Resolved(downtime) => {
                self.persist_downtime(&downtime).await;
                if let Some(end) = downtime.end {
                    self.events.publish(EngineEvent::DowntimeResolved {
                        network_id: network.id.clone(),
                        downtime_id: downtime.id.clone(),
                        start: downtime.start,
                        end,
                        timestamp: Utc::now(),
                    });
                }
                self.scheduler.terminate(&downtime.id);
                self.scheduler
                    .spawn_round(
                        network,
                        &downtime,
                        AttemptKind::Update,
                        EventType::Uptime,
                        UpdateRound::default(),
                    )
                    .await;
                self.scheduler.release(&downtime.id);
            }
            LifecycleOutcome::Annotated { downtime_id, .. } => {
                let Some(downtime) = slot.downtime.ongoing() else {
                    return;
                };
                debug!(network_id = %network.id, %downtime_id, "Intermittent during downtime");
                self.scheduler
                    .spawn_round(
                        network,
                        downtime,
                        AttemptKind::Update,
                        EventType::Intermittent,
                        UpdateRound::default(),
                    )
                    .await;
            }
            LifecycleOutcome::Ignored(reason) => {
                debug!(network_id = %network.id, ?reason, "Transition caused no lifecycle change");
            }
        }
    }

    async fn persist_downtime(&self, downtime: &Downtime) {
        if let Err(e) = self.store.save_downtime(downtime).await {
            warn!(downtime_id = %downtime.id, "Failed to persist downtime: {}", e);
        }
    }

    /// The slot for a network, hydrated from reference data and the store
    /// on first use.
    async fn slot(&self, network_id: &str) -> EngineResult<Arc<Mutex<NetworkSlot>>> {
        let existing = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(network_id)
            .cloned();
        if let Some(slot) = existing {
            return Ok(slot);
        }

        let mut network = self
            .reference
            .get_network(network_id)
            .await?
            .ok_or_else(|| EngineError::UnknownNetwork(network_id.to_string()))?;
        let ongoing = self.store.load_ongoing_downtime_for_network(network_id).await?;
        if let Some(downtime) = &ongoing {
            network.status = downtime.opened_by;
        }
        let fresh = Arc::new(Mutex::new(NetworkSlot {
            network,
            downtime: DowntimeSlot::with_ongoing(ongoing),
        }));
        // Locked before it becomes visible, so no sample can resolve the
        // downtime between hydration and the campaign resuming.
        let hydrating = fresh.clone().lock_owned().await;

        {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(raced) = slots.get(network_id) {
                return Ok(raced.clone());
            }
            slots.insert(network_id.to_string(), fresh.clone());
        }

        debug!(%network_id, ongoing = !hydrating.downtime.is_idle(), "Network slot hydrated");
        if let Some(downtime) = hydrating.downtime.ongoing() {
            self.resume_campaign(&hydrating.network, downtime).await?;
        }
        drop(hydrating);
        Ok(fresh)
    }

    /// Pick escalation back up for a downtime found open at hydration,
    /// unless someone already acknowledged it.
    async fn resume_campaign(&self, network: &Network, downtime: &Downtime) -> EngineResult<()> {
        let attempts = self.store.attempts_for_downtime(&downtime.id).await?;
        if attempts.iter().any(|a| a.status == DeliveryStatus::Responded) {
            info!(downtime_id = %downtime.id, "Hydrated downtime already acknowledged; not resuming");
            return Ok(());
        }
        info!(
            network_id = %network.id,
            downtime_id = %downtime.id,
            prior_attempts = attempts.len(),
            "Resuming escalation for hydrated downtime"
        );
        self.scheduler.start(network, downtime).await;
        Ok(())
    }
}
