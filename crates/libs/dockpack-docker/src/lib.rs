//! Container-based build orchestrator (C7): the ten-step state machine
//! that drives one build from image pull through registry push.

/// Error types for build-orchestrator operations.
pub mod error;

/// The `BuildOrchestrator` state machine.
pub mod orchestrator;

pub use error::{DockerError, Result};
pub use orchestrator::{BuildConfig, BuildOrchestrator, LogSender};
