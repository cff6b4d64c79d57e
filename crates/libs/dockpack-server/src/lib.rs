//! Internal loopback HTTP endpoint (C6) invoked by the `pre-receive` hook,
//! and the outbound webhook notifier (C8) fired after a successful build.

/// `AppState` and the axum router.
pub mod app;

/// Error types for the internal HTTP endpoint.
pub mod error;

/// The `PUT /` streaming build handler (C6).
pub mod handler;

/// Webhook notifier (C8).
pub mod webhook;

pub use app::{AppState, router};
pub use error::{Result, ServerError};
