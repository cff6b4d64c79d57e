//! Ambient stack shared by every dockpack crate: configuration loading and
//! tracing setup. Nothing here is specific to the receive pipeline or the
//! build orchestrator.

/// Process configuration, loaded from environment variables.
pub mod config;

/// Error types for configuration loading.
pub mod error;

/// `tracing` subscriber setup.
pub mod tracing_setup;

pub use config::AppConfig;
pub use error::{CommonError, Result};
