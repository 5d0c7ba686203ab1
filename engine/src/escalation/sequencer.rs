//! Level allocation per (channel, kind)
//!
//! Levels are handed out only when at least one attempt will carry them,
//! so each (downtime, channel, kind) sequence is 1, 2, 3, ... with no gaps
//! even when a channel has no recipients for some rounds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::types::{AlertAttempt, AttemptKind, Channel};

/// Shared sequencer for one downtime
pub type SharedSequencer = Arc<Mutex<LevelSequencer>>;

#[derive(Debug, Clone, Default)]
pub struct LevelSequencer {
    last: HashMap<(Channel, AttemptKind), u32>,
}

impl LevelSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after previously persisted attempts.
    pub fn from_attempts(attempts: &[AlertAttempt]) -> Self {
        let mut last: HashMap<(Channel, AttemptKind), u32> = HashMap::new();
        for attempt in attempts {
            let entry = last.entry((attempt.channel, attempt.kind)).or_insert(0);
            *entry = (*entry).max(attempt.level);
        }
        Self { last }
    }

    pub fn shared(self) -> SharedSequencer {
        Arc::new(Mutex::new(self))
    }

    /// Allocate the next level for `(channel, kind)`.
    pub fn next(&mut self, channel: Channel, kind: AttemptKind) -> u32 {
        let entry = self.last.entry((channel, kind)).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Highest level allocated for `kind` on any channel.
    pub fn max_level(&self, kind: AttemptKind) -> u32 {
        self.last
            .iter()
            .filter(|((_, k), _)| *k == kind)
            .map(|(_, level)| *level)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeliveryStatus, EventType};
    use chrono::Utc;

    #[test]
    fn test_sequences_are_independent() {
        let mut seq = LevelSequencer::new();
        assert_eq!(seq.next(Channel::Chat, AttemptKind::Alert), 1);
        assert_eq!(seq.next(Channel::Chat, AttemptKind::Alert), 2);
        assert_eq!(seq.next(Channel::Email, AttemptKind::Alert), 1);
        assert_eq!(seq.next(Channel::Chat, AttemptKind::Update), 1);
        assert_eq!(seq.max_level(AttemptKind::Alert), 2);
        assert_eq!(seq.max_level(AttemptKind::Response), 0);
    }

    #[test]
    fn test_seeded_from_history() {
        let attempt = |channel, level| AlertAttempt {
            id: format!("a{}", level),
            downtime_id: "dt-1".into(),
            channel,
            recipient_id: "r1".into(),
            address: "x".into(),
            kind: AttemptKind::Alert,
            event_type: EventType::Downtime,
            level,
            status: DeliveryStatus::Sent,
            external_id: None,
            failure_reason: None,
            created_at: Utc::now(),
            responded_at: None,
        };
        let mut seq = LevelSequencer::from_attempts(&[
            attempt(Channel::Chat, 1),
            attempt(Channel::Chat, 3),
            attempt(Channel::Chat, 2),
        ]);
        assert_eq!(seq.next(Channel::Chat, AttemptKind::Alert), 4);
        assert_eq!(seq.next(Channel::Email, AttemptKind::Alert), 1);
    }
}
