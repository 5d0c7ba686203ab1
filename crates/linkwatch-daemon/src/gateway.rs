//! HTTP webhook gateway
//!
//! POSTs each outbound message as JSON to a relay (chat bridge or mail
//! relay) and expects the relay's message id back, as `{"message_id": ".."}`
//! or `{"id": ".."}`. Replies are later reported against that id.

use std::time::Duration;

use async_trait::async_trait;
use linkwatch_engine::{Channel, ChannelGateway, GatewayError, OutboundMessage};
use serde::Serialize;
use tracing::debug;

use crate::config::WebhookConfig;

/// Client-side cap; the engine applies its own per-send timeout as well.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    channel: Channel,
    recipient_id: &'a str,
    recipient_name: &'a str,
    address: &'a str,
    kind: linkwatch_engine::AttemptKind,
    event_type: linkwatch_engine::EventType,
    subject: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_reply_to: Option<&'a str>,
}

pub struct WebhookGateway {
    channel: Channel,
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl WebhookGateway {
    pub fn new(channel: Channel, config: &WebhookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            channel,
            url: config.url.clone(),
            token: config.token.clone(),
            client,
        }
    }
}

#[async_trait]
impl ChannelGateway for WebhookGateway {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<String, GatewayError> {
        let body = WebhookRequest {
            channel: message.channel,
            recipient_id: &message.recipient_id,
            recipient_name: &message.recipient_name,
            address: &message.address,
            kind: message.kind,
            event_type: message.event_type,
            subject: &message.payload.subject,
            body: &message.payload.body,
            in_reply_to: message.in_reply_to.as_deref(),
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!("relay error ({}): {}", status, text)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("relay refused ({}): {}", status, text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("unreadable relay response: {}", e)))?;
        let id = json["message_id"]
            .as_str()
            .or_else(|| json["id"].as_str())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::Rejected("relay response has no message id".to_string()))?;

        debug!(channel = %self.channel, message_id = %id, "Relay accepted message");
        Ok(id.to_string())
    }
}
