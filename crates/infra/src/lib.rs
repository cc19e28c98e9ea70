//! Infrastructure layer: job runners, job and settings storage.

pub mod jobs;
pub mod settings;
