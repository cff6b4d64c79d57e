//! Error types for the build orchestrator.

use thiserror::Error;

/// Every variant here is fatal for the build in progress (spec §4.7: "all
/// on the same calling context; failures at any state transition are
/// fatal"). The `Step` variant's message is the one forwarded verbatim to
/// the hook as `BUILD ERROR - <reason>` by dockpack-server's C6 handler.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("{0}")]
    Step(String),

    #[error("docker daemon error: {0}")]
    Bollard(#[from] bollard::errors::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DockerError>;
