//! Process supervisor (C10): wires the repository workspace, the
//! identity backend, the SSH front door and the internal HTTP endpoint
//! together, allocates the internal port, loads the host key, and runs
//! the SSH accept loop to completion.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bollard::auth::DockerCredentials;
use dockpack_common::AppConfig;
use dockpack_common::config::RegistryCredentials;
use dockpack_core::identity::{GithubCollaboratorIdentity, IdentityBackend, OpenIdentity};
use dockpack_core::workspace::RepoWorkspace;
use dockpack_docker::BuildConfig;
use russh::keys::PrivateKey;
use russh::server::Server as _;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::server::DockpackServer;

/// Bind an ephemeral TCP port and immediately release it, handing the
/// chosen port number to the internal HTTP server.
async fn reserve_internal_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .context("failed to bind an ephemeral port")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn registry_credentials(reg: &RegistryCredentials) -> Option<DockerCredentials> {
    if reg.username.is_none() && reg.password.is_none() && reg.server.is_none() {
        return None;
    }
    Some(DockerCredentials {
        username: reg.username.clone(),
        password: reg.password.clone(),
        serveraddress: reg.server.clone(),
        ..Default::default()
    })
}

fn build_identity_backend(config: &AppConfig) -> Result<Arc<dyn IdentityBackend>> {
    if !config.github_auth.enabled {
        return Ok(Arc::new(OpenIdentity));
    }

    let token = config
        .github_auth
        .token
        .clone()
        .context("GITHUB_AUTH_TOKEN is required when GITHUB_AUTH is set")?;
    let owner = config
        .github_auth
        .owner
        .clone()
        .context("GITHUB_OWNER is required when GITHUB_AUTH is set")?;
    Ok(Arc::new(GithubCollaboratorIdentity::new(token, owner)?))
}

fn load_host_key(path: &str) -> Result<PrivateKey> {
    russh::keys::load_secret_key(path, None)
        .with_context(|| format!("unable to load SSH host key at {path}"))
}

/// Start the internal HTTP endpoint in the background, then run the SSH
/// accept loop to completion on the calling task (spec §4.10). Returns
/// only on a fatal startup or accept-loop error.
pub async fn run(config: AppConfig) -> Result<()> {
    let workspace = Arc::new(RepoWorkspace::new(config.workspace_dir.clone()));
    let identity = build_identity_backend(&config)?;

    let internal_port = reserve_internal_port()
        .await
        .context("failed to reserve the internal build endpoint port")?;
    info!(port = internal_port, "reserved internal build endpoint port");

    let build_config = BuildConfig {
        build_image: config.build_image.clone(),
        build_image_tag: config.build_image_tag.clone(),
        pull_credentials: registry_credentials(&config.pull_registry),
        push_credentials: registry_credentials(&config.push_registry),
        image_namespace: config.image_namespace.clone(),
        workspace_dir: config.workspace_dir.clone().into(),
        testing: config.is_testing(),
    };

    let app_state = Arc::new(dockpack_server::AppState {
        workspace: (*workspace).clone(),
        build_config,
        web_hook_url: config.web_hook.clone(),
        web_hook_insecure_tls: config.web_hook_insecure_tls,
    });

    let http_addr = SocketAddr::from(([127, 0, 0, 1], internal_port));
    let http_listener = TcpListener::bind(http_addr)
        .await
        .context("failed to bind internal HTTP endpoint")?;
    let app = dockpack_server::router(app_state);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app).await {
            error!(error = %e, "internal HTTP endpoint stopped");
        }
    });

    let host_key =
        load_host_key(&config.host_key_path).context("failed to load SSH host key")?;
    let ssh_config = Arc::new(russh::server::Config {
        keys: vec![host_key],
        ..Default::default()
    });

    let ssh_addr = format!("0.0.0.0:{}", config.ssh_port);
    let ssh_listener = TcpListener::bind(&ssh_addr)
        .await
        .with_context(|| format!("failed to bind SSH port {ssh_addr}"))?;
    info!(addr = %ssh_addr, "SSH front door listening");

    let mut server = DockpackServer::new(workspace, identity, internal_port);
    server
        .run_on_socket(ssh_config, &ssh_listener)
        .await
        .context("SSH accept loop terminated")?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reserved_port_is_free_afterwards() {
        let port = reserve_internal_port().await.unwrap();
        assert_ne!(port, 0);
        // The port was released, so binding it again should succeed.
        TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    }

    #[test]
    fn registry_credentials_is_none_when_all_fields_empty() {
        let reg = RegistryCredentials::default();
        assert!(registry_credentials(&reg).is_none());
    }

    #[test]
    fn registry_credentials_carries_partial_fields() {
        let reg = RegistryCredentials {
            username: Some("user".into()),
            password: None,
            server: None,
        };
        let creds = registry_credentials(&reg).unwrap();
        assert_eq!(creds.username.as_deref(), Some("user"));
    }

    #[test]
    fn build_identity_backend_defaults_to_open() {
        let config = AppConfig::default();
        assert!(build_identity_backend(&config).is_ok());
    }

    #[test]
    fn build_identity_backend_requires_token_when_github_auth_enabled() {
        let mut config = AppConfig::default();
        config.github_auth.enabled = true;
        assert!(build_identity_backend(&config).is_err());
    }
}
