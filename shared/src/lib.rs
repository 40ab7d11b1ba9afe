//! Shared storage, messaging and observability plumbing for the message service

// Re-export common dependencies
pub use anyhow;
pub use async_trait;
pub use thiserror;
pub use tracing;

pub mod database;
pub mod messaging;
pub mod observability;
