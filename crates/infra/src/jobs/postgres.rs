//! Postgres-backed job store.
//!
//! Each record is stored as one JSONB document keyed by its identifier:
//!
//! | Column | Type | Notes |
//! |--------|------|-------|
//! | `identifier` | `UUID` | primary key |
//! | `job_type` | `TEXT` | indexed, used by `list_by_type` |
//! | `record` | `JSONB` | full `PersistedJobRecord` |
//! | `updated_at` | `TIMESTAMPTZ` | last write |
//!
//! Rows whose document no longer decodes are logged and skipped so a single
//! corrupt row cannot block a runner from starting.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{instrument, warn};

use taskmill_core::JobId;

use super::store::{JobStore, JobStoreError};
use super::types::PersistedJobRecord;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scheduled_jobs (
    identifier UUID PRIMARY KEY,
    job_type TEXT NOT NULL,
    record JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS scheduled_jobs_job_type_idx ON scheduled_jobs (job_type);
"#;

/// Postgres job store.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the backing table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, record), fields(job_id = %record.identifier(), job_type = record.job_type()), err)]
    async fn put(&self, record: &PersistedJobRecord) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (identifier, job_type, record, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (identifier)
            DO UPDATE SET
                job_type = EXCLUDED.job_type,
                record = EXCLUDED.record,
                updated_at = NOW()
            "#,
        )
        .bind(record.identifier().as_uuid())
        .bind(record.job_type())
        .bind(sqlx::types::Json(record))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("put", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %identifier), err)]
    async fn remove(&self, identifier: JobId) -> Result<(), JobStoreError> {
        sqlx::query("DELETE FROM scheduled_jobs WHERE identifier = $1")
            .bind(identifier.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_by_type(&self, job_type: &str) -> Result<Vec<PersistedJobRecord>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT identifier, record
            FROM scheduled_jobs
            WHERE job_type = $1
            "#,
        )
        .bind(job_type)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_by_type", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let identifier: uuid::Uuid = row
                .try_get("identifier")
                .map_err(|e| map_sqlx_error("list_by_type", e))?;
            let document: serde_json::Value = match row.try_get("record") {
                Ok(v) => v,
                Err(e) => {
                    warn!(%identifier, error = %e, "skipping unreadable job row");
                    continue;
                }
            };
            match serde_json::from_value::<PersistedJobRecord>(document) {
                Ok(record) => records.push(record),
                Err(e) => warn!(%identifier, error = %e, "skipping malformed job record"),
            }
        }

        records.sort_by_key(|r| (r.meta.next_attempt_at(), r.identifier()));
        Ok(records)
    }
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            JobStoreError::Serialization(format!("{operation}: {err}"))
        }
        other => JobStoreError::Storage(format!("{operation}: {other}")),
    }
}
