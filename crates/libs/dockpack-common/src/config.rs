//! Process-level configuration, loaded once at startup from environment
//! variables.
//!
//! Nothing here is hot-reloaded: every field is read at process startup and
//! handed down as an `Arc<AppConfig>`.

use config::Config;
use serde::Deserialize;
use std::env;

use crate::error::Result;

/// Registry credentials used for either the pull side or the push side of
/// the buildpack image lifecycle.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RegistryCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub server: Option<String>,
}

/// GitHub-collaborator identity backend configuration. Only consulted when
/// `github_auth` is set.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GithubAuthConfig {
    pub enabled: bool,
    pub token: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Port the SSH front door listens on.
    pub ssh_port: u16,
    /// Path to the PEM-encoded SSH host key.
    pub host_key_path: String,
    /// Root of the on-disk workspace holding bare repos, tarballs and logs.
    pub workspace_dir: String,

    /// Buildpack image reference used to run `/build`.
    pub build_image: String,
    pub build_image_tag: String,

    pub pull_registry: RegistryCredentials,
    pub push_registry: RegistryCredentials,

    /// Namespace portion of the committed image name, e.g. `<namespace>/<repo>`.
    pub image_namespace: String,

    /// Webhook URL notified after a successful build. `None` disables notification.
    pub web_hook: Option<String>,
    /// Verify the webhook's TLS certificate. Defaults to `true`; the upstream
    /// project hardcoded `InsecureSkipVerify`, kept here as an explicit opt-out.
    pub web_hook_insecure_tls: bool,

    pub github_auth: GithubAuthConfig,

    /// `"testing"` skips the registry push step and is surfaced in build logs.
    pub env_mode: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ssh_port: 9999,
            host_key_path: "./id_rsa".to_string(),
            workspace_dir: "./sandbox".to_string(),
            build_image: "gliderlabs/herokuish".to_string(),
            build_image_tag: "latest".to_string(),
            pull_registry: RegistryCredentials::default(),
            push_registry: RegistryCredentials::default(),
            image_namespace: "dockpack".to_string(),
            web_hook: None,
            web_hook_insecure_tls: false,
            github_auth: GithubAuthConfig::default(),
            env_mode: "production".to_string(),
        }
    }
}

impl AppConfig {
    /// `true` when the registry push step should be skipped (§4.7, step 9).
    pub fn is_testing(&self) -> bool {
        self.env_mode.eq_ignore_ascii_case("testing")
    }

    /// Load configuration from the process environment.
    ///
    /// `PUSH_REGISTRY_*` falls back to the corresponding `PULL_REGISTRY_*`
    /// value when unset, matching the upstream behaviour.
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("ssh_port", defaults.ssh_port)?
            .set_default("host_key_path", defaults.host_key_path.clone())?
            .set_default("workspace_dir", defaults.workspace_dir.clone())?
            .set_default("build_image", defaults.build_image.clone())?
            .set_default("build_image_tag", defaults.build_image_tag.clone())?
            .set_default("image_namespace", defaults.image_namespace.clone())?
            .set_default("web_hook_insecure_tls", defaults.web_hook_insecure_tls)?
            .set_default("env_mode", defaults.env_mode.clone())?
            .set_default("github_auth.enabled", false)?;

        if let Ok(port) = env::var("SSH_PORT") {
            if let Ok(p) = port.parse::<i64>() {
                builder = builder.set_override("ssh_port", p)?;
            }
        }
        if let Ok(v) = env::var("DOCKPACK_HOST_KEY_PATH") {
            builder = builder.set_override("host_key_path", v)?;
        }
        if let Ok(v) = env::var("DOCKPACK_WORKSPACE_DIR") {
            builder = builder.set_override("workspace_dir", v)?;
        }
        if let Ok(v) = env::var("BUILD_IMAGE") {
            builder = builder.set_override("build_image", v)?;
        }
        if let Ok(v) = env::var("BUILD_IMAGE_TAG") {
            builder = builder.set_override("build_image_tag", v)?;
        }
        if let Ok(v) = env::var("IMAGE_NAMESPACE") {
            builder = builder.set_override("image_namespace", v)?;
        }
        if let Ok(v) = env::var("WEB_HOOK") {
            builder = builder.set_override("web_hook", v)?;
        }
        if parse_bool_env("WEBHOOK_INSECURE_TLS") {
            builder = builder.set_override("web_hook_insecure_tls", true)?;
        }
        if let Ok(v) = env::var("DOCKPACK_ENV") {
            builder = builder.set_override("env_mode", v)?;
        }

        let pull_user = env::var("PULL_REGISTRY_USERNAME").ok();
        let pull_pass = env::var("PULL_REGISTRY_PASSWORD").ok();
        let pull_server = env::var("PULL_REGISTRY_SERVER").ok();
        for (key, val) in [
            ("pull_registry.username", &pull_user),
            ("pull_registry.password", &pull_pass),
            ("pull_registry.server", &pull_server),
        ] {
            if let Some(v) = val {
                builder = builder.set_override(key, v.clone())?;
            }
        }

        // PUSH_REGISTRY_* falls back to the PULL_REGISTRY_* value when unset.
        let push_user = env::var("PUSH_REGISTRY_USERNAME").ok().or_else(|| pull_user.clone());
        let push_pass = env::var("PUSH_REGISTRY_PASSWORD").ok().or_else(|| pull_pass.clone());
        let push_server = env::var("PUSH_REGISTRY_SERVER").ok().or_else(|| pull_server.clone());
        for (key, val) in [
            ("push_registry.username", &push_user),
            ("push_registry.password", &push_pass),
            ("push_registry.server", &push_server),
        ] {
            if let Some(v) = val {
                builder = builder.set_override(key, v.clone())?;
            }
        }

        if parse_bool_env("GITHUB_AUTH") {
            builder = builder.set_override("github_auth.enabled", true)?;
        }
        if let Ok(v) = env::var("GITHUB_AUTH_TOKEN") {
            builder = builder.set_override("github_auth.token", v)?;
        }
        if let Ok(v) = env::var("GITHUB_OWNER") {
            builder = builder.set_override("github_auth.owner", v)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}

/// Parse boolean environment variable with truthy value detection.
fn parse_bool_env(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "t" | "y"))
        .unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.ssh_port, 9999);
        assert_eq!(cfg.build_image_tag, "latest");
        assert!(!cfg.is_testing());
    }

    #[tokio::test]
    async fn push_registry_falls_back_to_pull_registry() {
        temp_env::async_with_vars(
            [
                ("PULL_REGISTRY_USERNAME", Some("pull-user")),
                ("PULL_REGISTRY_SERVER", Some("registry.example.com")),
                ("PUSH_REGISTRY_USERNAME", None),
                ("SSH_PORT", None::<&str>),
            ],
            async {
                let cfg = AppConfig::load().expect("config loads");
                assert_eq!(cfg.push_registry.username.as_deref(), Some("pull-user"));
                assert_eq!(cfg.push_registry.server.as_deref(), Some("registry.example.com"));
            },
        )
        .await;
    }

    #[tokio::test]
    async fn testing_env_mode_is_recognised() {
        temp_env::async_with_vars([("DOCKPACK_ENV", Some("testing"))], async {
            let cfg = AppConfig::load().expect("config loads");
            assert!(cfg.is_testing());
        })
        .await;
    }
}
