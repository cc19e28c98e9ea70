//! Host process: configuration, concrete collaborators and the trigger timer.

pub mod avatar_fs;
pub mod config;
pub mod http;
pub mod services;
pub mod timer;
