//! Response Correlator
//!
//! Maps an inbound reply (channel plus the provider id of the message being
//! answered) back to the alert attempt it acknowledges, and stops that
//! downtime's escalation. The first acknowledgement wins; later replies to
//! the same downtime are reported as duplicates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::escalation::{AckOutcome, EscalationScheduler};
use crate::events::{EngineEvent, SharedEventBus};
use crate::ports::SharedStore;
use crate::recipients::RecipientResolver;
use crate::types::{
    AlertAttempt, AttemptKind, Channel, DeliveryStatus, Downtime, NetworkId, Recipient,
    RecipientRole, ResolvedRecipient,
};

/// What an inbound reply turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// The reply acknowledged `attempt`; escalation for `downtime` stopped
    Acknowledged {
        downtime: Downtime,
        attempt: AlertAttempt,
        responder: ResolvedRecipient,
    },
    /// No attempt carries this provider id on this channel
    Unmatched,
    /// The reply answers an update or acknowledgement message
    NotAnAlert,
    /// The downtime was already resolved
    Stale,
    /// Another reply already acknowledged this downtime
    Duplicate,
    /// The acknowledgement could not be recorded
    Rejected,
}

pub struct ResponseCorrelator {
    store: SharedStore,
    scheduler: Arc<EscalationScheduler>,
    resolver: RecipientResolver,
    events: SharedEventBus,
}

impl ResponseCorrelator {
    pub fn new(
        store: SharedStore,
        scheduler: Arc<EscalationScheduler>,
        resolver: RecipientResolver,
        events: SharedEventBus,
    ) -> Self {
        Self {
            store,
            scheduler,
            resolver,
            events,
        }
    }

    /// Network owning the alert that `reference` identifies, if any.
    pub async fn network_for_reply(
        &self,
        channel: Channel,
        reference: &str,
    ) -> EngineResult<Option<NetworkId>> {
        let Some(attempt) = self.store.find_attempt_by_external_id(channel, reference).await? else {
            return Ok(None);
        };
        let downtime = self.store.get_downtime(&attempt.downtime_id).await?;
        if downtime.is_none() {
            warn!(attempt_id = %attempt.id, downtime_id = %attempt.downtime_id, "Attempt references a missing downtime");
        }
        Ok(downtime.map(|d| d.network_id))
    }

    /// Correlate a reply received on `channel` to the message `reference`.
    ///
    /// `ongoing` is the network's open downtime as its slot holds it; the
    /// caller keeps that slot locked until this returns, so a resolution
    /// cannot land between the check and the acknowledgement.
    pub async fn on_inbound_reply(
        &self,
        channel: Channel,
        reference: &str,
        at: DateTime<Utc>,
        ongoing: Option<&Downtime>,
    ) -> EngineResult<Correlation> {
        let Some(attempt) = self.store.find_attempt_by_external_id(channel, reference).await? else {
            debug!(%channel, %reference, "Reply does not match any attempt");
            return Ok(Correlation::Unmatched);
        };
        if attempt.kind != AttemptKind::Alert {
            debug!(attempt_id = %attempt.id, kind = %attempt.kind, "Reply to a non-alert message; ignoring");
            return Ok(Correlation::NotAnAlert);
        }

        let Some(downtime) = ongoing.filter(|d| d.id == attempt.downtime_id).cloned() else {
            debug!(downtime_id = %attempt.downtime_id, "Reply after resolution; ignoring");
            return Ok(Correlation::Stale);
        };
        if attempt.status == DeliveryStatus::Responded {
            return Ok(Correlation::Duplicate);
        }

        let outcome = self
            .scheduler
            .acknowledge(&downtime.id, &attempt.id, at)
            .await;
        let acknowledged = match outcome {
            AckOutcome::Acknowledged => true,
            AckOutcome::Rejected => return Ok(Correlation::Rejected),
            AckOutcome::NoCampaign => self.acknowledge_without_campaign(&attempt, at).await?,
        };
        if !acknowledged {
            return Ok(Correlation::Duplicate);
        }

        let mut attempt = attempt;
        attempt.status = DeliveryStatus::Responded;
        attempt.responded_at = Some(at);

        info!(
            network_id = %downtime.network_id,
            downtime_id = %downtime.id,
            attempt_id = %attempt.id,
            recipient_id = %attempt.recipient_id,
            "Reply correlated to alert"
        );
        self.events.publish(EngineEvent::ReplyCorrelated {
            network_id: downtime.network_id.clone(),
            downtime_id: downtime.id.clone(),
            attempt_id: attempt.id.clone(),
            channel,
            timestamp: at,
        });

        let responder = self.responder_for(&downtime.network_id, &attempt).await;
        Ok(Correlation::Acknowledged {
            downtime,
            attempt,
            responder,
        })
    }

    /// No campaign is registered for the downtime (an earlier reply ended it,
    /// or it never resumed after a restart): record the first
    /// acknowledgement directly.
    async fn acknowledge_without_campaign(
        &self,
        attempt: &AlertAttempt,
        at: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let history = self.store.attempts_for_downtime(&attempt.downtime_id).await?;
        if history.iter().any(|a| a.status == DeliveryStatus::Responded) {
            return Ok(false);
        }
        self.store
            .update_alert_attempt_status(&attempt.id, DeliveryStatus::Responded, at)
            .await?;
        Ok(true)
    }

    /// The contact behind an attempt, falling back to the attempt's own
    /// address when reference data no longer lists them.
    async fn responder_for(&self, network_id: &str, attempt: &AlertAttempt) -> ResolvedRecipient {
        match self.resolver.resolve(network_id).await {
            Ok(recipients) => {
                if let Some(found) = recipients
                    .into_iter()
                    .find(|r| r.recipient.id == attempt.recipient_id)
                {
                    return ResolvedRecipient {
                        channel: attempt.channel,
                        address: attempt.address.clone(),
                        ..found
                    };
                }
            }
            Err(e) => warn!(%network_id, "Could not resolve responder details: {}", e),
        }
        warn!(
            %network_id,
            recipient_id = %attempt.recipient_id,
            "Responder no longer listed; confirming with details taken from the attempt"
        );
        ResolvedRecipient {
            recipient: Recipient {
                id: attempt.recipient_id.clone(),
                name: attempt.recipient_id.clone(),
                role: RecipientRole::SitePic,
                priority: 0,
                active: true,
                chat_address: None,
                email: None,
            },
            channel: attempt.channel,
            address: attempt.address.clone(),
        }
    }
}
