//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use taskmill_core::JobId;

use super::types::PersistedJobRecord;

/// Durable storage for persisted job records.
///
/// Writes are per record (keyed by identifier), so runners sharing one store
/// never contend on the same row.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Insert or overwrite the record with the same identifier.
    async fn put(&self, record: &PersistedJobRecord) -> Result<(), JobStoreError>;

    /// Delete a record. Removing an absent record is not an error.
    async fn remove(&self, identifier: JobId) -> Result<(), JobStoreError>;

    /// All records of a job type, earliest due first.
    async fn list_by_type(&self, job_type: &str) -> Result<Vec<PersistedJobRecord>, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: RwLock<HashMap<JobId, PersistedJobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn get(&self, identifier: JobId) -> Option<PersistedJobRecord> {
        self.records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&identifier)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, record: &PersistedJobRecord) -> Result<(), JobStoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;
        records.insert(record.identifier(), record.clone());
        Ok(())
    }

    async fn remove(&self, identifier: JobId) -> Result<(), JobStoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;
        records.remove(&identifier);
        Ok(())
    }

    async fn list_by_type(&self, job_type: &str) -> Result<Vec<PersistedJobRecord>, JobStoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;
        let mut result: Vec<_> = records
            .values()
            .filter(|r| r.job_type() == job_type)
            .cloned()
            .collect();

        result.sort_by_key(|r| (r.meta.next_attempt_at(), r.identifier()));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::jobs::types::JobMeta;

    fn record(job_type: &str, offset_secs: i64) -> PersistedJobRecord {
        PersistedJobRecord {
            meta: JobMeta::new(
                job_type,
                JobId::new(),
                2,
                Duration::from_secs(1),
                Utc::now() + chrono::Duration::seconds(offset_secs),
            ),
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn put_overwrites_by_identifier() {
        let store = InMemoryJobStore::new();
        let first = record("A", 0);
        store.put(&first).await.unwrap();

        let mut updated = first.clone();
        updated.payload = serde_json::json!({"v": 2});
        store.put(&updated).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(first.identifier()).unwrap().payload["v"], 2);
    }

    #[tokio::test]
    async fn list_filters_by_type_and_orders_by_due_time() {
        let store = InMemoryJobStore::new();
        let late = record("A", 60);
        let early = record("A", -60);
        store.put(&late).await.unwrap();
        store.put(&record("B", 0)).await.unwrap();
        store.put(&early).await.unwrap();

        let listed = store.list_by_type("A").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.identifier()).collect();
        assert_eq!(ids, vec![early.identifier(), late.identifier()]);
    }

    #[tokio::test]
    async fn removing_absent_record_is_ok() {
        let store = InMemoryJobStore::new();
        store.remove(JobId::new()).await.unwrap();
        assert!(store.is_empty());
    }
}
