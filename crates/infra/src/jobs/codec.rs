//! Job type registry: rebuilds concrete jobs from persisted records.
//!
//! Each job type registers a factory under its type tag. Factories receive
//! the record payload and capture whatever collaborators the job needs, so
//! reconstruction never relies on globals.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::types::{Job, PersistedJobRecord, ScheduledJob};

type JobFactory =
    Box<dyn Fn(&serde_json::Value) -> Result<Arc<dyn Job>, serde_json::Error> + Send + Sync>;

/// Failure to turn a persisted record back into a job.
#[derive(Debug, thiserror::Error)]
pub enum JobCodecError {
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("malformed payload for {job_type}: {source}")]
    MalformedPayload {
        job_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("factory for {expected} produced a {found} job")]
    TypeMismatch {
        expected: String,
        found: &'static str,
    },
}

/// Map from job type tag to factory.
#[derive(Default)]
pub struct JobTypeRegistry {
    factories: HashMap<String, JobFactory>,
}

impl core::fmt::Debug for JobTypeRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut types: Vec<_> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("JobTypeRegistry")
            .field("job_types", &types)
            .finish()
    }
}

impl JobTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `job_type`, replacing any previous one.
    pub fn register<F>(&mut self, job_type: &'static str, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn Job>, serde_json::Error>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(job_type.to_string(), Box::new(factory));
    }

    /// Register a job whose payload is all it needs (no injected collaborators).
    pub fn register_serde<J>(&mut self, job_type: &'static str)
    where
        J: Job + DeserializeOwned,
    {
        self.register(job_type, |payload| {
            let job: J = serde_json::from_value(payload.clone())?;
            Ok(Arc::new(job) as Arc<dyn Job>)
        });
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.factories.contains_key(job_type)
    }

    pub fn decode(&self, record: &PersistedJobRecord) -> Result<ScheduledJob, JobCodecError> {
        let job_type = record.job_type();
        let factory = self
            .factories
            .get(job_type)
            .ok_or_else(|| JobCodecError::UnknownJobType(job_type.to_string()))?;

        let job = factory(&record.payload).map_err(|source| JobCodecError::MalformedPayload {
            job_type: job_type.to_string(),
            source,
        })?;

        if job.job_type() != job_type {
            return Err(JobCodecError::TypeMismatch {
                expected: job_type.to_string(),
                found: job.job_type(),
            });
        }

        Ok(ScheduledJob::from_parts(record.meta.clone(), job))
    }
}
