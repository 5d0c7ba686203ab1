//! Core domain types for link monitoring and downtime escalation
//!
//! Every status or category code is a closed enum so the state machines in
//! `detector`, `lifecycle` and `escalation` can be matched exhaustively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a monitored network (circuit)
pub type NetworkId = String;

/// Unique identifier for a downtime record
pub type DowntimeId = String;

/// Unique identifier for an alert attempt
pub type AttemptId = String;

/// Unique identifier for a recipient (site PIC or ISP helpdesk)
pub type RecipientId = String;

/// Health of a network link as reported by the ping source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Link unreachable
    Down,
    /// Link healthy
    Up,
    /// Link flapping or degraded
    Intermittent,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Down => write!(f, "down"),
            LinkStatus::Up => write!(f, "up"),
            LinkStatus::Intermittent => write!(f, "intermittent"),
        }
    }
}

/// A monitored network as known to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Unique network identifier
    pub id: NetworkId,
    /// Human-readable name (circuit id, branch name)
    pub name: String,
    /// Owning site reference
    pub site_id: String,
    /// Providing ISP reference
    pub isp_id: String,
    /// Last resolved status
    pub status: LinkStatus,
    /// Last observed latency in milliseconds
    pub latency_ms: Option<u32>,
    /// Timestamp of the most recent accepted sample
    pub last_update: Option<DateTime<Utc>>,
}

impl Network {
    /// Create a network that has not been observed yet
    pub fn new(
        id: impl Into<NetworkId>,
        name: impl Into<String>,
        site_id: impl Into<String>,
        isp_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            site_id: site_id.into(),
            isp_id: isp_id.into(),
            status: LinkStatus::Up,
            latency_ms: None,
            last_update: None,
        }
    }
}

/// One raw health sample for a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSample {
    pub network_id: NetworkId,
    pub status: LinkStatus,
    #[serde(default)]
    pub latency_ms: Option<u32>,
    pub observed_at: DateTime<Utc>,
}

impl LinkSample {
    pub fn new(
        network_id: impl Into<NetworkId>,
        status: LinkStatus,
        latency_ms: Option<u32>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            network_id: network_id.into(),
            status,
            latency_ms,
            observed_at,
        }
    }
}

/// A status change emitted by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub network_id: NetworkId,
    pub from: LinkStatus,
    pub to: LinkStatus,
    pub at: DateTime<Utc>,
    pub latency_ms: Option<u32>,
}

/// Status of a downtime record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowntimeStatus {
    /// Outage in progress
    Ongoing,
    /// Outage closed; record is immutable history
    Resolved,
}

impl std::fmt::Display for DowntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DowntimeStatus::Ongoing => write!(f, "ongoing"),
            DowntimeStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// Operator-entered cause of a downtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowntimeCategory {
    /// Upstream provider outage
    IspOutage,
    /// Site power loss
    PowerOutage,
    /// Router, modem or cabling fault
    Hardware,
    /// Misconfiguration on site equipment
    Configuration,
    /// Planned maintenance
    Maintenance,
    Other,
}

impl std::fmt::Display for DowntimeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DowntimeCategory::IspOutage => write!(f, "isp_outage"),
            DowntimeCategory::PowerOutage => write!(f, "power_outage"),
            DowntimeCategory::Hardware => write!(f, "hardware"),
            DowntimeCategory::Configuration => write!(f, "configuration"),
            DowntimeCategory::Maintenance => write!(f, "maintenance"),
            DowntimeCategory::Other => write!(f, "other"),
        }
    }
}

/// A recorded outage window for one network
///
/// Only [`Downtime::open`] and [`Downtime::resolve`] change `status`/`end`,
/// which keeps `end.is_some() == (status == Resolved)` and `end >= start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Downtime {
    pub id: DowntimeId,
    pub network_id: NetworkId,
    pub description: Option<String>,
    pub ticket_number: Option<String>,
    pub category: Option<DowntimeCategory>,
    pub subcategory: Option<String>,
    /// Status of the transition that opened this downtime
    pub opened_by: LinkStatus,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub status: DowntimeStatus,
}

impl Downtime {
    /// Open a new ongoing downtime
    pub fn open(
        network_id: impl Into<NetworkId>,
        opened_by: LinkStatus,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            network_id: network_id.into(),
            description: None,
            ticket_number: None,
            category: None,
            subcategory: None,
            opened_by,
            start,
            end: None,
            status: DowntimeStatus::Ongoing,
        }
    }

    /// Seal the downtime. A close time before `start` is clamped to `start`.
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.end = Some(at.max(self.start));
        self.status = DowntimeStatus::Resolved;
    }

    pub fn is_ongoing(&self) -> bool {
        self.status == DowntimeStatus::Ongoing
    }

    /// Event type that alerts for this downtime carry
    pub fn alert_event_type(&self) -> EventType {
        match self.opened_by {
            LinkStatus::Intermittent => EventType::Intermittent,
            LinkStatus::Down | LinkStatus::Up => EventType::Downtime,
        }
    }
}

/// Outbound notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Chat,
    Email,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Chat => write!(f, "chat"),
            Channel::Email => write!(f, "email"),
        }
    }
}

/// Logical purpose of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    /// Escalating outage alert
    Alert,
    /// Confirmation sent back to whoever acknowledged
    Response,
    /// Out-of-band status update (intermittent, uptime, enrichment)
    Update,
}

impl std::fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptKind::Alert => write!(f, "alert"),
            AttemptKind::Response => write!(f, "response"),
            AttemptKind::Update => write!(f, "update"),
        }
    }
}

/// What happened to the link, as communicated to recipients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Downtime,
    Uptime,
    Intermittent,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Downtime => write!(f, "downtime"),
            EventType::Uptime => write!(f, "uptime"),
            EventType::Intermittent => write!(f, "intermittent"),
        }
    }
}

/// Delivery outcome of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Accepted by the channel gateway
    Sent,
    /// A human replied to this attempt
    Responded,
    /// The gateway could not deliver
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Responded => write!(f, "responded"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One outbound notification tied to a downtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAttempt {
    pub id: AttemptId,
    pub downtime_id: DowntimeId,
    pub channel: Channel,
    pub recipient_id: RecipientId,
    pub address: String,
    pub kind: AttemptKind,
    pub event_type: EventType,
    /// Escalation level, gapless from 1 per (downtime, channel, kind)
    pub level: u32,
    pub status: DeliveryStatus,
    /// Provider message id, present when the send succeeded
    pub external_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Which side of a circuit a contact belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    /// Person in charge at the site; notified first
    SitePic,
    /// ISP helpdesk contact
    IspHelpdesk,
}

impl std::fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientRole::SitePic => write!(f, "site_pic"),
            RecipientRole::IspHelpdesk => write!(f, "isp_helpdesk"),
        }
    }
}

/// A contact eligible to receive alerts for a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub name: String,
    pub role: RecipientRole,
    /// Lower values are notified first within a role
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub chat_address: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Recipient {
    /// Preferred channel and its address: chat when a chat address exists,
    /// else email. `None` when the contact is unreachable.
    pub fn preferred_channel(&self) -> Option<(Channel, &str)> {
        fn non_empty(s: &Option<String>) -> Option<&str> {
            s.as_deref().map(str::trim).filter(|addr| !addr.is_empty())
        }

        if let Some(chat) = non_empty(&self.chat_address) {
            return Some((Channel::Chat, chat));
        }
        non_empty(&self.email).map(|email| (Channel::Email, email))
    }
}

/// A recipient annotated with the channel it will be reached on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecipient {
    pub recipient: Recipient,
    pub channel: Channel,
    pub address: String,
}
