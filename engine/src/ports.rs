//! Collaborator ports
//!
//! The engine owns no storage and no reference data. The host supplies a
//! [`DowntimeStore`] and a [`ReferenceData`] provider; [`MemoryStore`] is the
//! in-process store used by the daemon and by tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use crate::types::{
    AlertAttempt, Channel, DeliveryStatus, Downtime, DowntimeStatus, Network, Recipient,
};

/// Persistence collaborator.
///
/// Fields are written by a single owning component each (detector owns
/// network status, lifecycle owns downtime status, dispatch and correlator
/// own attempt status), so last-writer-wins per record is sufficient.
#[async_trait]
pub trait DowntimeStore: Send + Sync {
    async fn save_network(&self, network: &Network) -> EngineResult<()>;

    async fn save_downtime(&self, downtime: &Downtime) -> EngineResult<()>;

    async fn get_downtime(&self, downtime_id: &str) -> EngineResult<Option<Downtime>>;

    async fn load_ongoing_downtime_for_network(
        &self,
        network_id: &str,
    ) -> EngineResult<Option<Downtime>>;

    async fn save_alert_attempt(&self, attempt: &AlertAttempt) -> EngineResult<()>;

    /// Set an attempt's delivery status. `Responded` also stamps `responded_at`.
    async fn update_alert_attempt_status(
        &self,
        attempt_id: &str,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> EngineResult<()>;

    async fn find_attempt_by_external_id(
        &self,
        channel: Channel,
        external_id: &str,
    ) -> EngineResult<Option<AlertAttempt>>;

    async fn attempts_for_downtime(&self, downtime_id: &str) -> EngineResult<Vec<AlertAttempt>>;
}

/// Reference-data collaborator (sites, ISPs, contacts).
#[async_trait]
pub trait ReferenceData: Send + Sync {
    async fn get_network(&self, network_id: &str) -> EngineResult<Option<Network>>;

    /// All contacts attached to the network's site and ISP, in any order.
    async fn get_recipients_for_network(&self, network_id: &str) -> EngineResult<Vec<Recipient>>;
}

/// Shared reference to a store
pub type SharedStore = Arc<dyn DowntimeStore>;

/// Shared reference to a reference-data provider
pub type SharedReferenceData = Arc<dyn ReferenceData>;

#[derive(Default)]
struct MemoryTables {
    networks: HashMap<String, Network>,
    downtimes: HashMap<String, Downtime>,
    attempts: HashMap<String, AlertAttempt>,
    /// (channel, external id) → attempt id
    external_ids: HashMap<(Channel, String), String>,
}

/// In-memory [`DowntimeStore`]
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn read(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, MemoryTables>> {
        self.tables
            .read()
            .map_err(|_| EngineError::Store("lock poisoned".to_string()))
    }

    fn write(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, MemoryTables>> {
        self.tables
            .write()
            .map_err(|_| EngineError::Store("lock poisoned".to_string()))
    }

    pub fn network(&self, network_id: &str) -> EngineResult<Option<Network>> {
        Ok(self.read()?.networks.get(network_id).cloned())
    }

    /// All downtimes for a network, oldest first
    pub fn downtimes_for_network(&self, network_id: &str) -> EngineResult<Vec<Downtime>> {
        let mut downtimes: Vec<Downtime> = self
            .read()?
            .downtimes
            .values()
            .filter(|d| d.network_id == network_id)
            .cloned()
            .collect();
        downtimes.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(downtimes)
    }

    /// Every attempt in the store, oldest first
    pub fn all_attempts(&self) -> EngineResult<Vec<AlertAttempt>> {
        let mut attempts: Vec<AlertAttempt> = self.read()?.attempts.values().cloned().collect();
        attempts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.level.cmp(&b.level)));
        Ok(attempts)
    }
}

#[async_trait]
impl DowntimeStore for MemoryStore {
    async fn save_network(&self, network: &Network) -> EngineResult<()> {
        self.write()?
            .networks
            .insert(network.id.clone(), network.clone());
        Ok(())
    }

    async fn save_downtime(&self, downtime: &Downtime) -> EngineResult<()> {
        self.write()?
            .downtimes
            .insert(downtime.id.clone(), downtime.clone());
        Ok(())
    }

    async fn get_downtime(&self, downtime_id: &str) -> EngineResult<Option<Downtime>> {
        Ok(self.read()?.downtimes.get(downtime_id).cloned())
    }

    async fn load_ongoing_downtime_for_network(
        &self,
        network_id: &str,
    ) -> EngineResult<Option<Downtime>> {
        Ok(self
            .read()?
            .downtimes
            .values()
            .filter(|d| d.network_id == network_id && d.status == DowntimeStatus::Ongoing)
            .max_by(|a, b| a.start.cmp(&b.start))
            .cloned())
    }

    async fn save_alert_attempt(&self, attempt: &AlertAttempt) -> EngineResult<()> {
        let mut tables = self.write()?;
        if let Some(external_id) = &attempt.external_id {
            tables
                .external_ids
                .insert((attempt.channel, external_id.clone()), attempt.id.clone());
        }
        tables.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn update_alert_attempt_status(
        &self,
        attempt_id: &str,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut tables = self.write()?;
        let attempt = tables
            .attempts
            .get_mut(attempt_id)
            .ok_or_else(|| EngineError::Store(format!("attempt not found: {}", attempt_id)))?;
        attempt.status = status;
        if status == DeliveryStatus::Responded {
            attempt.responded_at = Some(at);
        }
        Ok(())
    }

    async fn find_attempt_by_external_id(
        &self,
        channel: Channel,
        external_id: &str,
    ) -> EngineResult<Option<AlertAttempt>> {
        let tables = self.read()?;
        Ok(tables
            .external_ids
            .get(&(channel, external_id.to_string()))
            .and_then(|id| tables.attempts.get(id))
            .cloned())
    }

    async fn attempts_for_downtime(&self, downtime_id: &str) -> EngineResult<Vec<AlertAttempt>> {
        let mut attempts: Vec<AlertAttempt> = self
            .read()?
            .attempts
            .values()
            .filter(|a| a.downtime_id == downtime_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.level.cmp(&b.level)));
        Ok(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttemptKind, EventType, LinkStatus};

    fn attempt(id: &str, downtime_id: &str, external_id: Option<&str>) -> AlertAttempt {
        AlertAttempt {
            id: id.to_string(),
            downtime_id: downtime_id.to_string(),
            channel: Channel::Chat,
            recipient_id: "r1".to_string(),
            address: "+62811".to_string(),
            kind: AttemptKind::Alert,
            event_type: EventType::Downtime,
            level: 1,
            status: if external_id.is_some() {
                DeliveryStatus::Sent
            } else {
                DeliveryStatus::Failed
            },
            external_id: external_id.map(String::from),
            failure_reason: None,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    #[tokio::test]
    async fn test_ongoing_lookup_ignores_resolved() {
        let store = MemoryStore::new();
        let mut old = Downtime::open("net-1", LinkStatus::Down, Utc::now());
        old.resolve(Utc::now());
        store.save_downtime(&old).await.unwrap();
        assert!(store
            .load_ongoing_downtime_for_network("net-1")
            .await
            .unwrap()
            .is_none());

        let current = Downtime::open("net-1", LinkStatus::Down, Utc::now());
        store.save_downtime(&current).await.unwrap();
        let found = store
            .load_ongoing_downtime_for_network("net-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, current.id);
    }

    #[tokio::test]
    async fn test_external_id_lookup_is_per_channel() {
        let store = MemoryStore::new();
        store
            .save_alert_attempt(&attempt("a1", "dt-1", Some("msg-1")))
            .await
            .unwrap();
        store
            .save_alert_attempt(&attempt("a2", "dt-1", None))
            .await
            .unwrap();

        let found = store
            .find_attempt_by_external_id(Channel::Chat, "msg-1")
            .await
            .unwrap();
        assert_eq!(found.map(|a| a.id), Some("a1".to_string()));
        assert!(store
            .find_attempt_by_external_id(Channel::Email, "msg-1")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.attempts_for_downtime("dt-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_status_stamps_responded_at() {
        let store = MemoryStore::new();
        store
            .save_alert_attempt(&attempt("a1", "dt-1", Some("msg-1")))
            .await
            .unwrap();
        let at = Utc::now();
        store
            .update_alert_attempt_status("a1", DeliveryStatus::Responded, at)
            .await
            .unwrap();

        let updated = store
            .find_attempt_by_external_id(Channel::Chat, "msg-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, DeliveryStatus::Responded);
        assert_eq!(updated.responded_at, Some(at));

        let err = store
            .update_alert_attempt_status("missing", DeliveryStatus::Failed, at)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }
}
