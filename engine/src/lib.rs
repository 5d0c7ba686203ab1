//! Linkwatch Engine Library
//!
//! Watches network link health and chases people until someone answers:
//!
//! - **Detection**: turns raw health samples into Up/Down/Intermittent
//!   transitions, dropping stale and repeated samples
//! - **Lifecycle**: opens and resolves downtime records, at most one open
//!   per network
//! - **Escalation**: one campaign task per open downtime, re-alerting site
//!   PICs and ISP helpdesks at increasing levels on a backoff curve
//! - **Dispatch**: chat and email gateways behind a bounded worker pool
//! - **Correlation**: an inbound reply to any alert stops the campaign
//!
//! # Usage
//!
//! ```ignore
//! use linkwatch_engine::{Engine, EngineConfig, Dispatcher, LinkSample, LinkStatus};
//!
//! let engine = Engine::new(config, store, directory, dispatcher)?;
//! engine.ingest(&LinkSample::new("net-1", LinkStatus::Down, None, now)).await?;
//! // ... later, a reply arrives on the chat gateway
//! engine.on_inbound_reply(Channel::Chat, "msg-42", now).await?;
//! engine.shutdown().await;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod correlator;
pub mod detector;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod events;
pub mod lifecycle;
pub mod message;
pub mod ports;
pub mod recipients;
pub mod types;

pub use config::{
    DetectorConfig, DispatchConfig, EngineConfig, EscalationConfig, IntermittentPolicy,
    LifecycleConfig,
};
pub use correlator::{Correlation, ResponseCorrelator};
pub use detector::StatusDetector;
pub use dispatch::{AttemptResult, ChannelGateway, Dispatcher, GatewayError, OutboundMessage};
pub use engine::{DowntimeUpdate, Engine, UpdateContext};
pub use error::{EngineError, EngineResult};
pub use escalation::{AckOutcome, BackoffPolicy, EscalationScheduler};
pub use events::{EngineEvent, EventBus, EventBusExt, EventFilter, TerminationReason};
pub use lifecycle::{DowntimeLifecycle, DowntimeSlot, IgnoreReason, LifecycleOutcome};
pub use message::Payload;
pub use ports::{DowntimeStore, MemoryStore, ReferenceData, SharedReferenceData, SharedStore};
pub use recipients::RecipientResolver;
pub use types::{
    AlertAttempt, AttemptKind, Channel, DeliveryStatus, Downtime, DowntimeCategory,
    DowntimeStatus, EventType, LinkSample, LinkStatus, Network, Recipient, RecipientRole,
    ResolvedRecipient, Transition,
};
