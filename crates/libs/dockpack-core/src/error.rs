//! Error types for dockpack-core operations.

use thiserror::Error;

/// Errors surfaced by the receive pipeline's domain logic (C1–C5).
///
/// `AuthDenied`, `CommandNotAllowed` and `RepoBusy` are refused to the SSH
/// client as a pkt-line and the session closes cleanly; `Setup`/`Git2`/`Io`
/// abort `prepareRepo` before `git-receive-pack` is ever started.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The identity backend denied the push. Carries the message sent
    /// verbatim to the client.
    #[error("{0}")]
    AuthDenied(String),

    /// The requested exec command is not in the `{git-receive-pack,
    /// git-upload-pack}` whitelist.
    #[error("{0} not allowed on this server")]
    CommandNotAllowed(String),

    /// Another push to the same repo is in flight.
    #[error("repo is locked, try again later")]
    RepoBusy,

    /// A repository name failed validation (path traversal, empty, etc).
    #[error("invalid repository name: {0}")]
    InvalidRepoName(String),

    /// `ensure`/hook installation failed for a reason not covered by a
    /// more specific variant.
    #[error("setup failed: {0}")]
    Setup(String),

    #[error("git error: {0}")]
    Git2(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
