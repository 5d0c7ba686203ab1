//! Event types published by the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    AttemptId, AttemptKind, Channel, DeliveryStatus, DowntimeId, LinkStatus, NetworkId,
};

/// All engine events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The detector accepted a status change
    TransitionDetected {
        network_id: NetworkId,
        from: LinkStatus,
        to: LinkStatus,
        timestamp: DateTime<Utc>,
    },

    /// A downtime was opened
    DowntimeOpened {
        network_id: NetworkId,
        downtime_id: DowntimeId,
        opened_by: LinkStatus,
        timestamp: DateTime<Utc>,
    },

    /// A downtime was sealed
    DowntimeResolved {
        network_id: NetworkId,
        downtime_id: DowntimeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// An operator enriched an ongoing downtime
    DowntimeUpdated {
        network_id: NetworkId,
        downtime_id: DowntimeId,
        actor: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// An escalation campaign task was spawned
    CampaignStarted {
        network_id: NetworkId,
        downtime_id: DowntimeId,
        timestamp: DateTime<Utc>,
    },

    /// A campaign round fired
    LevelFired {
        network_id: NetworkId,
        downtime_id: DowntimeId,
        level: u32,
        recipients: usize,
        timestamp: DateTime<Utc>,
    },

    /// An attempt was persisted
    AttemptRecorded {
        network_id: NetworkId,
        downtime_id: DowntimeId,
        attempt_id: AttemptId,
        channel: Channel,
        kind: AttemptKind,
        level: u32,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    },

    /// A campaign stopped escalating
    CampaignTerminated {
        network_id: NetworkId,
        downtime_id: DowntimeId,
        reason: TerminationReason,
        last_level: u32,
        timestamp: DateTime<Utc>,
    },

    /// An inbound reply acknowledged an attempt
    ReplyCorrelated {
        network_id: NetworkId,
        downtime_id: DowntimeId,
        attempt_id: AttemptId,
        channel: Channel,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::TransitionDetected { timestamp, .. } => *timestamp,
            EngineEvent::DowntimeOpened { timestamp, .. } => *timestamp,
            EngineEvent::DowntimeResolved { timestamp, .. } => *timestamp,
            EngineEvent::DowntimeUpdated { timestamp, .. } => *timestamp,
            EngineEvent::CampaignStarted { timestamp, .. } => *timestamp,
            EngineEvent::LevelFired { timestamp, .. } => *timestamp,
            EngineEvent::AttemptRecorded { timestamp, .. } => *timestamp,
            EngineEvent::CampaignTerminated { timestamp, .. } => *timestamp,
            EngineEvent::ReplyCorrelated { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::TransitionDetected { .. } => "transition_detected",
            EngineEvent::DowntimeOpened { .. } => "downtime_opened",
            EngineEvent::DowntimeResolved { .. } => "downtime_resolved",
            EngineEvent::DowntimeUpdated { .. } => "downtime_updated",
            EngineEvent::CampaignStarted { .. } => "campaign_started",
            EngineEvent::LevelFired { .. } => "level_fired",
            EngineEvent::AttemptRecorded { .. } => "attempt_recorded",
            EngineEvent::CampaignTerminated { .. } => "campaign_terminated",
            EngineEvent::ReplyCorrelated { .. } => "reply_correlated",
        }
    }

    /// Every event concerns exactly one network
    pub fn network_id(&self) -> &str {
        match self {
            EngineEvent::TransitionDetected { network_id, .. }
            | EngineEvent::DowntimeOpened { network_id, .. }
            | EngineEvent::DowntimeResolved { network_id, .. }
            | EngineEvent::DowntimeUpdated { network_id, .. }
            | EngineEvent::CampaignStarted { network_id, .. }
            | EngineEvent::LevelFired { network_id, .. }
            | EngineEvent::AttemptRecorded { network_id, .. }
            | EngineEvent::CampaignTerminated { network_id, .. }
            | EngineEvent::ReplyCorrelated { network_id, .. } => network_id,
        }
    }

    /// Get the downtime ID if this event is downtime-scoped
    pub fn downtime_id(&self) -> Option<&str> {
        match self {
            EngineEvent::TransitionDetected { .. } => None,
            EngineEvent::DowntimeOpened { downtime_id, .. }
            | EngineEvent::DowntimeResolved { downtime_id, .. }
            | EngineEvent::DowntimeUpdated { downtime_id, .. }
            | EngineEvent::CampaignStarted { downtime_id, .. }
            | EngineEvent::LevelFired { downtime_id, .. }
            | EngineEvent::AttemptRecorded { downtime_id, .. }
            | EngineEvent::CampaignTerminated { downtime_id, .. }
            | EngineEvent::ReplyCorrelated { downtime_id, .. } => Some(downtime_id),
        }
    }
}

/// Why a campaign stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The downtime was resolved
    Resolved,
    /// A recipient acknowledged an attempt
    Responded,
    /// The engine is shutting down
    Shutdown,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Resolved => write!(f, "resolved"),
            TerminationReason::Responded => write!(f, "responded"),
            TerminationReason::Shutdown => write!(f, "shutdown"),
        }
    }
}
