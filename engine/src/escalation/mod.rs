//! Escalation Scheduler
//!
//! ```text
//!            start(downtime)
//!                  │
//!                  ▼
//!          ┌───────────────┐  fire round   ┌────────────┐
//!          │   Campaign    │──────────────▶│ Dispatcher │
//!          │ (tokio task)  │◀──────────────│            │
//!          └───────────────┘   attempts    └────────────┘
//!            │    ▲     │
//!   cancel   │    │ ack │ sleep backoff.delay(level)
//!            ▼    │     ▼
//!      Resolved / Responded / Shutdown
//! ```
//!
//! Levels are numbered per (downtime, channel, kind) by a [`LevelSequencer`]
//! shared between the campaign and the one-off update rounds.

pub mod backoff;
mod campaign;
pub mod round;
pub mod scheduler;
pub mod sequencer;

pub use backoff::BackoffPolicy;
pub use campaign::{CampaignCommand, CampaignHandle};
pub use round::{RoundContext, RoundSpec};
pub use scheduler::{AckOutcome, EscalationScheduler, UpdateRound};
pub use sequencer::{LevelSequencer, SharedSequencer};
