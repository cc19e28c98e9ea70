//! Postgres-backed settings store (`settings` table, JSONB values).

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{SettingsError, SettingsStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

#[derive(Debug, Clone)]
pub struct PostgresSettingsStore {
    pool: Arc<PgPool>,
}

impl PostgresSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), SettingsError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| SettingsError::Storage(format!("ensure_schema: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for PostgresSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, SettingsError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| SettingsError::Storage(format!("get: {e}")))?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row
                    .try_get("value")
                    .map_err(|e| SettingsError::Storage(format!("get: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), SettingsError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&*self.pool)
        .await
        .map_err(|e| SettingsError::Storage(format!("put: {e}")))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SettingsError> {
        sqlx::query("DELETE FROM settings WHERE key = $1")
            .bind(key)
            .execute(&*self.pool)
            .await
            .map_err(|e| SettingsError::Storage(format!("remove: {e}")))?;
        Ok(())
    }
}
