//! `handle_exec` (C9 continued): payload parsing, identity check, command
//! whitelist, `prepareRepo`, child spawn with piped stdio, exit-status
//! request, deferred unlock.
//!
//! Some SSH servers built directly on low-level request plumbing need to
//! strip a 4-byte string length prefix from the raw exec payload before
//! parsing the command. russh's `exec_request` hands the command string
//! already decoded, so no such stripping happens here (see DESIGN.md).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use dockpack_core::hook::HookConfig;
use dockpack_core::identity::IdentityBackend;
use dockpack_core::pktline::write_pkt_line;
use dockpack_core::types::RepoName;
use dockpack_core::workspace::RepoWorkspace;
use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

/// Exec commands whitelisted against the pusher's channel.
const ALLOWED_COMMANDS: [&str; 2] = ["git-receive-pack", "git-upload-pack"];

/// Per-connection state `handle_exec` needs beyond the exec payload
/// itself: the workspace, the identity backend, the internal HTTP port
/// (so `prepareRepo` can render a hook pointing at it), and the shared
/// stdin-relay map the `data`/`channel_eof` handlers feed.
pub struct ExecContext {
    pub workspace: Arc<RepoWorkspace>,
    pub identity: Arc<dyn IdentityBackend>,
    pub internal_port: u16,
    pub stdin_channels: Arc<Mutex<HashMap<ChannelId, mpsc::UnboundedSender<Vec<u8>>>>>,
}

/// Parse the exec payload into `(command, repo)`. The repository path
/// arrives single-quoted and suffixed `.git`, e.g. `'/demo.git'`.
fn parse_payload(payload: &[u8]) -> Option<(String, String)> {
    let text = std::str::from_utf8(payload).ok()?;
    let (command, quoted_path) = text.trim().split_once(' ')?;
    let repo = quoted_path.strip_prefix("'/")?.strip_suffix(".git'")?;
    Some((command.to_string(), repo.to_string()))
}

/// Send a pkt-line refusal, the SSH exit-status request, then close the
/// channel — the shared tail of every refusal path below.
async fn refuse(handle: &Handle, channel: ChannelId, message: &str) {
    let mut buf = Vec::new();
    let _ = write_pkt_line(&mut buf, &format!("{message}\n")).await;
    let _ = handle.data(channel, CryptoVec::from(buf)).await;
    let _ = handle.exit_status_request(channel, 1).await;
    let _ = handle.close(channel).await;
}

/// The body of `handle_exec`: authenticate, whitelist, `prepareRepo`,
/// spawn, pipe, wait, report, unlock. Runs in a spawned task so the
/// `Handler`'s `exec_request` can return immediately and keep dispatching
/// `data`/`channel_eof` for this and other channels.
pub async fn handle_exec(
    ctx: ExecContext,
    handle: Handle,
    channel: ChannelId,
    payload: Vec<u8>,
    stashed_identity: Option<(String, String)>,
) {
    let Some((command, repo_raw)) = parse_payload(&payload) else {
        refuse(&handle, channel, "malformed exec request").await;
        return;
    };

    let repo = match RepoName::parse(&repo_raw) {
        Ok(repo) => repo,
        Err(e) => {
            refuse(&handle, channel, &e.to_string()).await;
            return;
        }
    };

    let Some((user, public_key)) = stashed_identity else {
        refuse(&handle, channel, "no identity on session").await;
        return;
    };

    if let Err(e) = ctx
        .identity
        .authenticate(&user, &public_key, repo.as_str())
        .await
    {
        refuse(&handle, channel, &e.to_string()).await;
        return;
    }

    if !ALLOWED_COMMANDS.contains(&command.as_str()) {
        refuse(
            &handle,
            channel,
            &format!("{command} not allowed on this server"),
        )
        .await;
        return;
    }

    let hook_config = HookConfig {
        internal_port: ctx.internal_port,
        workspace_dir: ctx.workspace.root().to_path_buf(),
    };

    let repo_path = match ctx.workspace.prepare_repo(&repo, &hook_config).await {
        Ok(path) => path,
        Err(e) => {
            refuse(&handle, channel, &e.to_string()).await;
            return;
        }
    };

    let mut child = match Command::new(&command)
        .arg(&repo_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(repo = %repo, command = %command, error = %e, "failed to spawn git command");
            refuse(&handle, channel, "failed to start git command").await;
            ctx.workspace.unlock(&repo).await;
            return;
        }
    };

    let mut stdin = child.stdin.take().expect("child spawned with piped stdin");
    let mut stdout = child
        .stdout
        .take()
        .expect("child spawned with piped stdout");
    let mut stderr = child
        .stderr
        .take()
        .expect("child spawned with piped stderr");

    let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    ctx.stdin_channels.lock().await.insert(channel, stdin_tx);

    // Writer: channel data -> child stdin. Ends when the client closes
    // its side of the channel and `channel_eof` drops the sender.
    let writer = tokio::spawn(async move {
        while let Some(chunk) = stdin_rx.recv().await {
            if stdin.write_all(&chunk).await.is_err() {
                break;
            }
        }
        let _ = stdin.shutdown().await;
    });

    // Reader: child stdout -> channel data.
    let stdout_handle = handle.clone();
    let reader_out = tokio::spawn(async move {
        let mut buf = [0u8; 32 * 1024];
        loop {
            match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if stdout_handle
                        .data(channel, CryptoVec::from(&buf[..n]))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    // Reader: child stderr -> channel extended data (SSH data-type 1).
    let stderr_handle = handle.clone();
    let reader_err = tokio::spawn(async move {
        let mut buf = [0u8; 32 * 1024];
        loop {
            match stderr.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if stderr_handle
                        .extended_data(channel, 1, CryptoVec::from(&buf[..n]))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    // All three pipe copiers must finish before the child wait is reported.
    let _ = writer.await;
    let _ = reader_out.await;
    let _ = reader_err.await;
    ctx.stdin_channels.lock().await.remove(&channel);

    let wait_result = child.wait().await;
    let exit_code = dockpack_core::exit_status::translate(&wait_result);
    info!(repo = %repo, command = %command, exit_code, "git command finished");

    let _ = handle.exit_status_request(channel, exit_code).await;
    let _ = handle.close(channel).await;

    ctx.workspace.unlock(&repo).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_receive_pack_payload() {
        let (command, repo) = parse_payload(b"git-receive-pack '/demo.git'").unwrap();
        assert_eq!(command, "git-receive-pack");
        assert_eq!(repo, "demo");
    }

    #[test]
    fn parses_upload_pack_payload() {
        let (command, repo) = parse_payload(b"git-upload-pack '/demo.git'").unwrap();
        assert_eq!(command, "git-upload-pack");
        assert_eq!(repo, "demo");
    }

    #[test]
    fn rejects_payload_without_quoted_path() {
        assert!(parse_payload(b"git-receive-pack demo").is_none());
    }

    #[test]
    fn rejects_payload_missing_git_suffix() {
        assert!(parse_payload(b"git-receive-pack '/demo'").is_none());
    }
}
