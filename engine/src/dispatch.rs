//! Channel Dispatch Adapter
//!
//! Hands rendered messages to the gateway registered for a channel and turns
//! every outcome into an [`AttemptResult`]. Transport problems become
//! `DeliveryStatus::Failed`; nothing here returns an error to the caller,
//! and nothing is retried here. Retry cadence belongs to escalation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::message::Payload;
use crate::types::{AttemptKind, Channel, DeliveryStatus, EventType, ResolvedRecipient};

/// Transport-level failure reported by a gateway
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Gateway unreachable or not configured
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    /// Address cannot be delivered to on this channel
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Gateway accepted the request but refused the message
    #[error("Rejected by gateway: {0}")]
    Rejected(String),

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

/// One message ready for a gateway
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub recipient_id: String,
    pub recipient_name: String,
    pub address: String,
    pub kind: AttemptKind,
    pub event_type: EventType,
    pub payload: Payload,
    /// Provider message id this message answers, for threading replies
    pub in_reply_to: Option<String>,
}

/// A physical channel transport (chat API, mail relay)
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    fn channel(&self) -> Channel;

    /// Deliver the message and return the provider's message id.
    async fn send(&self, message: &OutboundMessage) -> Result<String, GatewayError>;
}

/// Outcome of one send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    pub status: DeliveryStatus,
    pub external_id: Option<String>,
    pub failure_reason: Option<String>,
}

impl AttemptResult {
    fn sent(external_id: String) -> Self {
        Self {
            status: DeliveryStatus::Sent,
            external_id: Some(external_id),
            failure_reason: None,
        }
    }

    fn failed(err: &GatewayError) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            external_id: None,
            failure_reason: Some(err.to_string()),
        }
    }
}

/// Routes messages to per-channel gateways
pub struct Dispatcher {
    gateways: HashMap<Channel, Arc<dyn ChannelGateway>>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            gateways: HashMap::new(),
            config,
        }
    }

    /// Register a gateway; a later gateway for the same channel replaces it.
    pub fn with_gateway(mut self, gateway: Arc<dyn ChannelGateway>) -> Self {
        self.gateways.insert(gateway.channel(), gateway);
        self
    }

    pub fn has_gateway(&self, channel: Channel) -> bool {
        self.gateways.contains_key(&channel)
    }

    /// Send one message to `recipient` on `channel`.
    pub async fn send(
        &self,
        recipient: &ResolvedRecipient,
        channel: Channel,
        kind: AttemptKind,
        event_type: EventType,
        payload: Payload,
    ) -> AttemptResult {
        let message = OutboundMessage {
            channel,
            recipient_id: recipient.recipient.id.clone(),
            recipient_name: recipient.recipient.name.clone(),
            address: recipient.address.clone(),
            kind,
            event_type,
            payload,
            in_reply_to: None,
        };
        self.deliver(&message).await
    }

    /// Deliver a prepared message, mapping every failure to `Failed`.
    pub async fn deliver(&self, message: &OutboundMessage) -> AttemptResult {
        match self.try_deliver(message).await {
            Ok(external_id) => {
                debug!(
                    channel = %message.channel,
                    recipient_id = %message.recipient_id,
                    %external_id,
                    "Message sent"
                );
                AttemptResult::sent(external_id)
            }
            Err(err) => {
                warn!(
                    channel = %message.channel,
                    recipient_id = %message.recipient_id,
                    error = %err,
                    "Message delivery failed"
                );
                AttemptResult::failed(&err)
            }
        }
    }

    /// Deliver many messages through a bounded worker pool.
    ///
    /// Results come back in input order.
    pub async fn deliver_all(&self, messages: Vec<OutboundMessage>) -> Vec<(OutboundMessage, AttemptResult)> {
        let width = self.config.max_concurrent_sends.max(1);
        let mut results: Vec<(usize, OutboundMessage, AttemptResult)> =
            stream::iter(messages.into_iter().enumerate())
                .map(|(idx, message)| async move {
                    let result = self.deliver(&message).await;
                    (idx, message, result)
                })
                .buffer_unordered(width)
                .collect()
                .await;
        results.sort_by_key(|(idx, _, _)| *idx);
        results
            .into_iter()
            .map(|(_, message, result)| (message, result))
            .collect()
    }

    async fn try_deliver(&self, message: &OutboundMessage) -> Result<String, GatewayError> {
        validate_address(message.channel, &message.address)?;
        let gateway = self.gateways.get(&message.channel).ok_or_else(|| {
            GatewayError::Unavailable(format!("no gateway registered for {}", message.channel))
        })?;
        let timeout = self.config.send_timeout();
        match tokio::time::timeout(timeout, gateway.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout)),
        }
    }
}

fn validate_address(channel: Channel, address: &str) -> Result<(), GatewayError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(GatewayError::InvalidAddress(format!("empty {} address", channel)));
    }
    if channel == Channel::Email {
        let valid = address
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !valid {
            return Err(GatewayError::InvalidAddress(address.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Recipient, RecipientRole};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        channel: Channel,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl ChannelGateway for Echo {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, message: &OutboundMessage) -> Result<String, GatewayError> {
            let n = self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}-{}", message.recipient_id, n))
        }
    }

    struct Down;

    #[async_trait]
    impl ChannelGateway for Down {
        fn channel(&self) -> Channel {
            Channel::Email
        }

        async fn send(&self, _: &OutboundMessage) -> Result<String, GatewayError> {
            Err(GatewayError::Unavailable("smtp relay offline".into()))
        }
    }

    struct Stalled;

    #[async_trait]
    impl ChannelGateway for Stalled {
        fn channel(&self) -> Channel {
            Channel::Chat
        }

        async fn send(&self, _: &OutboundMessage) -> Result<String, GatewayError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".into())
        }
    }

    fn recipient(id: &str, channel: Channel, address: &str) -> ResolvedRecipient {
        ResolvedRecipient {
            recipient: Recipient {
                id: id.to_string(),
                name: id.to_string(),
                role: RecipientRole::SitePic,
                priority: 0,
                active: true,
                chat_address: None,
                email: None,
            },
            channel,
            address: address.to_string(),
        }
    }

    fn payload() -> Payload {
        Payload {
            subject: "s".into(),
            body: "b".into(),
        }
    }

    #[tokio::test]
    async fn test_success_yields_external_id() {
        let dispatcher = Dispatcher::new(DispatchConfig::default()).with_gateway(Arc::new(Echo {
            channel: Channel::Chat,
            sent: AtomicUsize::new(0),
        }));
        let result = dispatcher
            .send(
                &recipient("r1", Channel::Chat, "+62811"),
                Channel::Chat,
                AttemptKind::Alert,
                EventType::Downtime,
                payload(),
            )
            .await;
        assert_eq!(result.status, DeliveryStatus::Sent);
        assert_eq!(result.external_id.as_deref(), Some("r1-0"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_recorded_not_raised() {
        let dispatcher = Dispatcher::new(DispatchConfig::default()).with_gateway(Arc::new(Down));
        let result = dispatcher
            .send(
                &recipient("r1", Channel::Email, "noc@example.com"),
                Channel::Email,
                AttemptKind::Alert,
                EventType::Downtime,
                payload(),
            )
            .await;
        assert_eq!(result.status, DeliveryStatus::Failed);
        assert!(result.external_id.is_none());
        assert!(result.failure_reason.unwrap().contains("smtp relay offline"));
    }

    #[tokio::test]
    async fn test_missing_gateway_and_bad_address_fail() {
        let dispatcher = Dispatcher::new(DispatchConfig::default());
        let no_gateway = dispatcher
            .send(
                &recipient("r1", Channel::Chat, "+62811"),
                Channel::Chat,
                AttemptKind::Alert,
                EventType::Downtime,
                payload(),
            )
            .await;
        assert_eq!(no_gateway.status, DeliveryStatus::Failed);

        let bad_email = dispatcher
            .send(
                &recipient("r1", Channel::Email, "not-an-address"),
                Channel::Email,
                AttemptKind::Alert,
                EventType::Downtime,
                payload(),
            )
            .await;
        assert!(bad_email
            .failure_reason
            .unwrap()
            .starts_with("Invalid address"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout() {
        let config = DispatchConfig {
            send_timeout_secs: 5,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(config).with_gateway(Arc::new(Stalled));
        let result = dispatcher
            .send(
                &recipient("r1", Channel::Chat, "+62811"),
                Channel::Chat,
                AttemptKind::Alert,
                EventType::Downtime,
                payload(),
            )
            .await;
        assert_eq!(result.status, DeliveryStatus::Failed);
        assert!(result.failure_reason.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_deliver_all_preserves_order() {
        let dispatcher = Dispatcher::new(DispatchConfig {
            max_concurrent_sends: 2,
            ..Default::default()
        })
        .with_gateway(Arc::new(Echo {
            channel: Channel::Chat,
            sent: AtomicUsize::new(0),
        }));

        let messages: Vec<OutboundMessage> = (0..5)
            .map(|i| OutboundMessage {
                channel: Channel::Chat,
                recipient_id: format!("r{}", i),
                recipient_name: format!("R{}", i),
                address: "+62811".into(),
                kind: AttemptKind::Alert,
                event_type: EventType::Downtime,
                payload: payload(),
                in_reply_to: None,
            })
            .collect();

        let results = dispatcher.deliver_all(messages).await;
        let ids: Vec<&str> = results.iter().map(|(m, _)| m.recipient_id.as_str()).collect();
        assert_eq!(ids, vec!["r0", "r1", "r2", "r3", "r4"]);
        assert!(results
            .iter()
            .all(|(_, r)| r.status == DeliveryStatus::Sent));
    }
}
