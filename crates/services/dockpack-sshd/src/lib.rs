//! SSH front door (C9) and process supervisor (C10).
//!
//! This crate terminates the Git smart-transport protocol over SSH,
//! authenticates the pusher (deferred to the first exec request so
//! refusals can be reported as pkt-line Git protocol messages), and pipes
//! `git-receive-pack`/`git-upload-pack` to the channel. The supervisor
//! wires this together with the internal HTTP endpoint from
//! `dockpack-server`.

/// `handle_exec`: payload parsing, identity check, command whitelist,
/// `prepareRepo`, child spawn and pipe plumbing, exit-status request.
pub mod exec;

/// The russh `Server`/`Handler` implementation (C9).
pub mod server;

/// Process supervisor (C10): wires everything together at startup.
pub mod supervisor;
