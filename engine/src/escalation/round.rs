//! One dispatch round: allocate levels, render, send, persist, publish.
//!
//! Shared by campaign fires (alerts) and out-of-band updates and
//! acknowledgements. A round never fails as a whole: failed sends become
//! Failed attempts and store errors are logged.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::dispatch::{Dispatcher, OutboundMessage};
use crate::events::{EngineEvent, SharedEventBus};
use crate::message::{self, MessageContext};
use crate::ports::SharedStore;
use crate::types::{AlertAttempt, AttemptKind, Channel, Downtime, EventType, Network, ResolvedRecipient};

use super::sequencer::SharedSequencer;

/// Collaborators every round needs
#[derive(Clone)]
pub struct RoundContext {
    pub store: SharedStore,
    pub events: SharedEventBus,
    pub dispatcher: Arc<Dispatcher>,
}

/// What to send in a round
pub struct RoundSpec<'a> {
    pub network: &'a Network,
    pub downtime: &'a Downtime,
    pub kind: AttemptKind,
    pub event_type: EventType,
    pub recipients: &'a [ResolvedRecipient],
    pub sequencer: &'a SharedSequencer,
    pub responder: Option<&'a str>,
    pub in_reply_to: Option<&'a str>,
}

/// Run one round and return the recorded attempts in recipient order.
pub async fn run_round(ctx: &RoundContext, spec: RoundSpec<'_>) -> Vec<AlertAttempt> {
    if spec.recipients.is_empty() {
        debug!(
            downtime_id = %spec.downtime.id,
            kind = %spec.kind,
            "No recipients; nothing to dispatch"
        );
        return Vec::new();
    }

    let levels = allocate_levels(&spec);
    let now = Utc::now();

    let messages: Vec<OutboundMessage> = spec
        .recipients
        .iter()
        .map(|recipient| {
            let level = levels.get(&recipient.channel).copied().unwrap_or(1);
            let payload = message::render(
                spec.kind,
                spec.event_type,
                &MessageContext {
                    network_name: &spec.network.name,
                    downtime: spec.downtime,
                    level,
                    responder: spec.responder,
                    at: now,
                },
            );
            OutboundMessage {
                channel: recipient.channel,
                recipient_id: recipient.recipient.id.clone(),
                recipient_name: recipient.recipient.name.clone(),
                address: recipient.address.clone(),
                kind: spec.kind,
                event_type: spec.event_type,
                payload,
                in_reply_to: spec.in_reply_to.map(String::from),
            }
        })
        .collect();

    let results = ctx.dispatcher.deliver_all(messages).await;

    let mut attempts = Vec::with_capacity(results.len());
    for (message, result) in results {
        let attempt = AlertAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            downtime_id: spec.downtime.id.clone(),
            channel: message.channel,
            recipient_id: message.recipient_id,
            address: message.address,
            kind: spec.kind,
            event_type: spec.event_type,
            level: levels.get(&message.channel).copied().unwrap_or(1),
            status: result.status,
            external_id: result.external_id,
            failure_reason: result.failure_reason,
            created_at: Utc::now(),
            responded_at: None,
        };

        if let Err(e) = ctx.store.save_alert_attempt(&attempt).await {
            warn!(
                downtime_id = %attempt.downtime_id,
                attempt_id = %attempt.id,
                "Failed to persist attempt: {}",
                e
            );
        }

        ctx.events.publish(EngineEvent::AttemptRecorded {
            network_id: spec.network.id.clone(),
            downtime_id: attempt.downtime_id.clone(),
            attempt_id: attempt.id.clone(),
            channel: attempt.channel,
            kind: attempt.kind,
            level: attempt.level,
            status: attempt.status,
            timestamp: attempt.created_at,
        });
        attempts.push(attempt);
    }
    attempts
}

/// One level per channel present in this round.
fn allocate_levels(spec: &RoundSpec<'_>) -> BTreeMap<Channel, u32> {
    let mut sequencer = spec
        .sequencer
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut levels = BTreeMap::new();
    for recipient in spec.recipients {
        levels
            .entry(recipient.channel)
            .or_insert_with(|| sequencer.next(recipient.channel, spec.kind));
    }
    levels
}
