//! SSH front door (C9): terminates the Git smart-transport protocol,
//! authenticates the pusher, and dispatches to `git-receive-pack`/
//! `git-upload-pack`.
//!
//! The public-key callback always accepts syntactically; the actual
//! authorisation decision is deferred to the first exec request so a
//! denial can be reported as a Git protocol message over the channel
//! rather than as an opaque SSH auth failure.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use dockpack_core::identity::IdentityBackend;
use dockpack_core::workspace::RepoWorkspace;
use russh::keys::ssh_key::PublicKey;
use russh::server::{Auth, Handler, Msg, Server as RusshServer, Session};
use russh::{Channel, ChannelId};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::exec;

/// The russh `Server` factory. One `SessionHandler` is created per
/// accepted TCP connection (spec §5: "one task per connection").
#[derive(Clone)]
pub struct DockpackServer {
    workspace: Arc<RepoWorkspace>,
    identity: Arc<dyn IdentityBackend>,
    internal_port: u16,
}

impl DockpackServer {
    pub fn new(
        workspace: Arc<RepoWorkspace>,
        identity: Arc<dyn IdentityBackend>,
        internal_port: u16,
    ) -> Self {
        Self {
            workspace,
            identity,
            internal_port,
        }
    }
}

impl RusshServer for DockpackServer {
    type Handler = SessionHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> SessionHandler {
        debug!(?peer_addr, "accepted SSH connection");
        SessionHandler {
            workspace: self.workspace.clone(),
            identity: self.identity.clone(),
            internal_port: self.internal_port,
            stashed_identity: None,
            dispatched: HashSet::new(),
            stdin_channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// One per accepted connection. Holds the identity stashed by
/// `auth_publickey` — consulted only once the first `exec_request`
/// fires — and the per-channel stdin relay used to copy channel data
/// into the spawned child's stdin (spec §5: "one writer goroutine
/// copies channel->child").
pub struct SessionHandler {
    workspace: Arc<RepoWorkspace>,
    identity: Arc<dyn IdentityBackend>,
    internal_port: u16,
    stashed_identity: Option<(String, String)>,
    dispatched: HashSet<ChannelId>,
    stdin_channels: Arc<Mutex<HashMap<ChannelId, mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl Handler for SessionHandler {
    type Error = anyhow::Error;

    async fn auth_publickey_offered(
        &mut self,
        _user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        // Every syntactically valid key is accepted; authorisation is
        // deferred to the first exec request (spec §4.9, §9).
        let encoded = public_key.to_openssh()?;
        self.stashed_identity = Some((user.to_string(), encoded));
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        // Only the `session` channel type is handled here; russh rejects
        // every other `channel_open_*` request with `Prohibited` by
        // default because this handler overrides none of them.
        Ok(true)
    }

    async fn env_request(
        &mut self,
        _channel: ChannelId,
        _variable_name: &str,
        _variable_value: &str,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.dispatched.insert(channel) {
            // Only the first exec request on a channel is honoured, per
            // spec §4.9 ("enter handle_exec and return").
            return Ok(());
        }

        let ctx = exec::ExecContext {
            workspace: self.workspace.clone(),
            identity: self.identity.clone(),
            internal_port: self.internal_port,
            stdin_channels: self.stdin_channels.clone(),
        };
        let handle = session.handle();
        let payload = data.to_vec();
        let stashed = self.stashed_identity.clone();

        tokio::spawn(async move {
            exec::handle_exec(ctx, handle, channel, payload, stashed).await;
        });

        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let channels = self.stdin_channels.lock().await;
        if let Some(tx) = channels.get(&channel) {
            let _ = tx.send(data.to_vec());
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        // Dropping the sender closes the child's stdin, mirroring the
        // client half-closing its side of the channel.
        self.stdin_channels.lock().await.remove(&channel);
        Ok(())
    }
}
