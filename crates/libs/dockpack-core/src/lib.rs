//! Core domain logic of the receive pipeline: pkt-line framing, exit-status
//! translation, the identity backend, the repository workspace, the
//! pre-receive hook template, and the types shared between the SSH front
//! door, the internal HTTP endpoint, and the build orchestrator.
//!
//! Nothing in this crate talks to a container daemon or terminates SSH —
//! those concerns live in `dockpack-docker` and `dockpack-sshd`
//! respectively, both of which depend on this crate's types.

/// Error types for dockpack-core operations.
pub mod error;

/// Exit-status translation (C2).
pub mod exit_status;

/// Pre-receive hook rendering and installation (C5).
pub mod hook;

/// Identity backend (C3).
pub mod identity;

/// Packet-line framing (C1).
pub mod pktline;

/// Shared domain types: repo names, push requests, build results, Procfile.
pub mod types;

/// Repository workspace: bare-repo lifecycle and the per-repo lock (C4).
pub mod workspace;

pub use error::{CoreError, Result};
pub use types::{BuildResult, PushRequest, RepoName};
