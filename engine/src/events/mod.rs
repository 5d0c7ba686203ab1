//! Engine event stream
//!
//! Every decision the engine takes is published as an [`EngineEvent`] on a
//! Tokio broadcast bus. Hosts subscribe for audit trails, dashboards or
//! tests; the engine never waits on subscribers.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Detector   │     │              │     │              │
//! │  Lifecycle   │────▶│  Event Bus   │────▶│  Subscribers │
//! │  Scheduler   │     │  (broadcast) │     │   (recv)     │
//! │  Correlator  │     │              │     │              │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use linkwatch_engine::events::{EventBusExt, EventFilter};
//!
//! let mut opened = engine.events().subscribe_filtered(
//!     EventFilter::new().network("net-1").types(vec!["downtime_opened"]),
//! );
//! let event = opened.recv().await?;
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusExt, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::{EngineEvent, TerminationReason};
