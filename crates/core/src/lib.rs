//! `taskmill-core`: foundation types shared by the scheduler crates.
//!
//! This crate holds identifiers, the domain error model and the clock
//! abstraction. It has no storage or runtime wiring of its own.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, TimeAnchorClock};
pub use error::DomainError;
pub use id::JobId;
