//! Key-value settings storage used by jobs to persist their side effects.
//!
//! Values are JSON documents. Jobs write here only on paths that also report
//! success, so a crash mid-run never leaves half-applied state behind.

pub mod postgres;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

pub use postgres::PostgresSettingsStore;

/// Simple get/put/remove store for application settings.
#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, SettingsError>;

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), SettingsError>;

    async fn remove(&self, key: &str) -> Result<(), SettingsError>;
}

/// Settings store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory settings store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value synchronously (test setup).
    pub fn with_value(self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.values
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.into(), value);
        self
    }

    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.values.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, SettingsError> {
        let values = self
            .values
            .read()
            .map_err(|_| SettingsError::Storage("settings lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), SettingsError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| SettingsError::Storage("settings lock poisoned".to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SettingsError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| SettingsError::Storage("settings lock poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove() {
        let store = InMemorySettingsStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.put("k", serde_json::json!(5)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(serde_json::json!(5)));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn seeded_values_are_visible() {
        let store = InMemorySettingsStore::new().with_value("ticket", serde_json::json!(3));
        assert_eq!(store.get("ticket").await.unwrap(), Some(serde_json::json!(3)));
        assert_eq!(store.snapshot().len(), 1);
    }
}
