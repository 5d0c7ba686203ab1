//! Downtime Lifecycle Manager
//!
//! Per-network state machine over {Idle, Ongoing}. The open downtime lives
//! in a [`DowntimeSlot`], so "at most one Ongoing downtime per network" is a
//! property of the slot's shape rather than a query over history.
//!
//! ```text
//! Idle    ──Down──────────────────────────▶ Ongoing   (Opened)
//! Idle    ──Intermittent [open_campaign]──▶ Ongoing   (Opened)
//! Idle    ──Intermittent [annotate]───────▶ Idle      (Ignored)
//! Ongoing ──Up / manual resolve───────────▶ Idle      (Resolved)
//! Ongoing ──Intermittent──────────────────▶ Ongoing   (Annotated)
//! Ongoing ──Down──────────────────────────▶ Ongoing   (Ignored, duplicate)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{IntermittentPolicy, LifecycleConfig};
use crate::types::{Downtime, DowntimeId, LinkStatus, NetworkId, Transition};

/// The per-network arena entry holding the open downtime, if any.
#[derive(Debug, Clone, Default)]
pub struct DowntimeSlot {
    ongoing: Option<Downtime>,
}

impl DowntimeSlot {
    /// Slot hydrated from persistence. A resolved downtime is not kept.
    pub fn with_ongoing(downtime: Option<Downtime>) -> Self {
        Self {
            ongoing: downtime.filter(Downtime::is_ongoing),
        }
    }

    pub fn ongoing(&self) -> Option<&Downtime> {
        self.ongoing.as_ref()
    }

    /// Mutable access for operator enrichment; status and `end` stay with
    /// the lifecycle manager.
    pub(crate) fn ongoing_mut(&mut self) -> Option<&mut Downtime> {
        self.ongoing.as_mut()
    }

    pub fn is_idle(&self) -> bool {
        self.ongoing.is_none()
    }
}

/// Why a transition caused no lifecycle change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Down while a downtime is already open
    AlreadyOngoing,
    /// Recovery with no downtime open
    NotOngoing,
    /// Intermittent while idle under the annotate policy
    NotAlertWorthy,
}

/// Result of applying a transition to a slot
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleOutcome {
    /// A new downtime was opened; start escalation
    Opened(Downtime),
    /// The open downtime was sealed; stop escalation, send uptime update
    Resolved(Downtime),
    /// Intermittent while ongoing; context only
    Annotated {
        downtime_id: DowntimeId,
        status: LinkStatus,
    },
    Ignored(IgnoreReason),
}

/// Stateless lifecycle rules; the state lives in [`DowntimeSlot`].
#[derive(Debug, Clone, Default)]
pub struct DowntimeLifecycle {
    config: LifecycleConfig,
}

impl DowntimeLifecycle {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    /// Drive the slot with a detector transition.
    pub fn apply(&self, slot: &mut DowntimeSlot, transition: &Transition) -> LifecycleOutcome {
        match (transition.to, slot.ongoing.as_ref()) {
            (LinkStatus::Down, None) => self.open(slot, transition),
            (LinkStatus::Down, Some(existing)) => {
                warn!(
                    network_id = %transition.network_id,
                    downtime_id = %existing.id,
                    "Down transition while a downtime is already ongoing; ignoring"
                );
                LifecycleOutcome::Ignored(IgnoreReason::AlreadyOngoing)
            }
            (LinkStatus::Intermittent, None) => match self.config.intermittent_policy {
                IntermittentPolicy::OpenCampaign => self.open(slot, transition),
                IntermittentPolicy::Annotate => {
                    debug!(
                        network_id = %transition.network_id,
                        "Intermittent while idle; not alert-worthy under current policy"
                    );
                    LifecycleOutcome::Ignored(IgnoreReason::NotAlertWorthy)
                }
            },
            (LinkStatus::Intermittent, Some(existing)) => LifecycleOutcome::Annotated {
                downtime_id: existing.id.clone(),
                status: LinkStatus::Intermittent,
            },
            (LinkStatus::Up, _) => self.close(slot, &transition.network_id, transition.at),
        }
    }

    /// Manual resolution by an operator.
    pub fn resolve(
        &self,
        slot: &mut DowntimeSlot,
        network_id: &NetworkId,
        at: DateTime<Utc>,
    ) -> LifecycleOutcome {
        if slot.is_idle() {
            warn!(%network_id, "Resolve requested with no ongoing downtime; ignoring");
            return LifecycleOutcome::Ignored(IgnoreReason::NotOngoing);
        }
        self.close(slot, network_id, at)
    }

    fn open(&self, slot: &mut DowntimeSlot, transition: &Transition) -> LifecycleOutcome {
        let downtime = Downtime::open(transition.network_id.clone(), transition.to, transition.at);
        info!(
            network_id = %downtime.network_id,
            downtime_id = %downtime.id,
            opened_by = %transition.to,
            start = %downtime.start,
            "Downtime opened"
        );
        slot.ongoing = Some(downtime.clone());
        LifecycleOutcome::Opened(downtime)
    }

    fn close(
        &self,
        slot: &mut DowntimeSlot,
        network_id: &NetworkId,
        at: DateTime<Utc>,
    ) -> LifecycleOutcome {
        match slot.ongoing.take() {
            Some(mut downtime) => {
                downtime.resolve(at);
                info!(
                    %network_id,
                    downtime_id = %downtime.id,
                    start = %downtime.start,
                    end = ?downtime.end,
                    "Downtime resolved"
                );
                LifecycleOutcome::Resolved(downtime)
            }
            None => {
                debug!(%network_id, "Recovery with no ongoing downtime");
                LifecycleOutcome::Ignored(IgnoreReason::NotOngoing)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DowntimeStatus;
    use chrono::Duration;

    fn transition(from: LinkStatus, to: LinkStatus, at: DateTime<Utc>) -> Transition {
        Transition {
            network_id: "net-1".to_string(),
            from,
            to,
            at,
            latency_ms: None,
        }
    }

    #[test]
    fn test_down_opens_and_up_resolves() {
        let lifecycle = DowntimeLifecycle::default();
        let mut slot = DowntimeSlot::default();
        let t0 = Utc::now();

        let opened = lifecycle.apply(&mut slot, &transition(LinkStatus::Up, LinkStatus::Down, t0));
        let LifecycleOutcome::Opened(downtime) = opened else {
            panic!("expected Opened, got {:?}", opened);
        };
        assert_eq!(downtime.start, t0);
        assert_eq!(downtime.status, DowntimeStatus::Ongoing);
        assert_eq!(slot.ongoing().map(|d| d.id.clone()), Some(downtime.id.clone()));

        let t1 = t0 + Duration::minutes(7);
        let resolved =
            lifecycle.apply(&mut slot, &transition(LinkStatus::Down, LinkStatus::Up, t1));
        let LifecycleOutcome::Resolved(closed) = resolved else {
            panic!("expected Resolved, got {:?}", resolved);
        };
        assert_eq!(closed.id, downtime.id);
        assert_eq!(closed.end, Some(t1));
        assert!(slot.is_idle());
    }

    #[test]
    fn test_second_down_is_noop() {
        let lifecycle = DowntimeLifecycle::default();
        let mut slot = DowntimeSlot::default();
        let t0 = Utc::now();

        lifecycle.apply(&mut slot, &transition(LinkStatus::Up, LinkStatus::Down, t0));
        let first_id = slot.ongoing().unwrap().id.clone();

        let again = lifecycle.apply(
            &mut slot,
            &transition(LinkStatus::Intermittent, LinkStatus::Down, t0 + Duration::seconds(1)),
        );
        assert_eq!(again, LifecycleOutcome::Ignored(IgnoreReason::AlreadyOngoing));
        assert_eq!(slot.ongoing().unwrap().id, first_id);
    }

    #[test]
    fn test_intermittent_annotates_ongoing() {
        let lifecycle = DowntimeLifecycle::default();
        let mut slot = DowntimeSlot::default();
        let t0 = Utc::now();

        lifecycle.apply(&mut slot, &transition(LinkStatus::Up, LinkStatus::Down, t0));
        let outcome = lifecycle.apply(
            &mut slot,
            &transition(LinkStatus::Down, LinkStatus::Intermittent, t0 + Duration::seconds(30)),
        );
        assert!(matches!(outcome, LifecycleOutcome::Annotated { .. }));
        assert!(!slot.is_idle());
    }

    #[test]
    fn test_intermittent_policy() {
        let t0 = Utc::now();
        let flap = transition(LinkStatus::Up, LinkStatus::Intermittent, t0);

        let annotate = DowntimeLifecycle::default();
        let mut slot = DowntimeSlot::default();
        assert_eq!(
            annotate.apply(&mut slot, &flap),
            LifecycleOutcome::Ignored(IgnoreReason::NotAlertWorthy)
        );
        assert!(slot.is_idle());

        let open = DowntimeLifecycle::new(LifecycleConfig {
            intermittent_policy: IntermittentPolicy::OpenCampaign,
        });
        let outcome = open.apply(&mut slot, &flap);
        let LifecycleOutcome::Opened(downtime) = outcome else {
            panic!("expected Opened, got {:?}", outcome);
        };
        assert_eq!(downtime.opened_by, LinkStatus::Intermittent);
    }

    #[test]
    fn test_manual_resolve_when_idle_is_noop() {
        let lifecycle = DowntimeLifecycle::default();
        let mut slot = DowntimeSlot::default();
        assert_eq!(
            lifecycle.resolve(&mut slot, &"net-1".to_string(), Utc::now()),
            LifecycleOutcome::Ignored(IgnoreReason::NotOngoing)
        );
    }

    #[test]
    fn test_hydrated_slot_drops_resolved() {
        let mut resolved = Downtime::open("net-1", LinkStatus::Down, Utc::now());
        resolved.resolve(Utc::now());
        assert!(DowntimeSlot::with_ongoing(Some(resolved)).is_idle());
    }

    #[test]
    fn test_single_ongoing_over_arbitrary_sequence() {
        let lifecycle = DowntimeLifecycle::new(LifecycleConfig {
            intermittent_policy: IntermittentPolicy::OpenCampaign,
        });
        let mut slot = DowntimeSlot::default();
        let statuses = [
            LinkStatus::Down,
            LinkStatus::Down,
            LinkStatus::Intermittent,
            LinkStatus::Up,
            LinkStatus::Intermittent,
            LinkStatus::Down,
            LinkStatus::Up,
            LinkStatus::Up,
        ];
        let t0 = Utc::now();
        let mut open = 0i32;
        let mut prev = LinkStatus::Up;
        for (i, status) in statuses.iter().enumerate() {
            let at = t0 + Duration::seconds(i as i64);
            match lifecycle.apply(&mut slot, &transition(prev, *status, at)) {
                LifecycleOutcome::Opened(_) => open += 1,
                LifecycleOutcome::Resolved(d) => {
                    open -= 1;
                    assert!(d.end.unwrap() >= d.start);
                }
                _ => {}
            }
            assert!((0..=1).contains(&open));
            prev = *status;
        }
    }
}
