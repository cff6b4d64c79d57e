//! Identity backend (C3): decides whether `(user, public_key, repo)` may
//! push.
//!
//! Grounded on `original_source/auth/{auth,github}.go`, which spoke the
//! GitHub REST API through the `go-github` SDK. This crate has no GitHub
//! SDK in its dependency graph, so the two calls it made
//! (`ListCollaborators`, `Users.ListKeys`) are reimplemented directly over
//! `reqwest` against the same REST v3 endpoints.

use serde::Deserialize;

use crate::error::{CoreError, Result};

/// `authenticate(user, public_key, repo) -> ok | denied(reason)` (spec
/// §4.3). Consulted once per SSH session, after the public-key callback
/// has stashed the caller's identity but before any command runs.
#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn authenticate(&self, user: &str, public_key: &str, repo: &str) -> Result<()>;
}

/// Always authorises. Selected when `GITHUB_AUTH` is unset.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenIdentity;

#[async_trait::async_trait]
impl IdentityBackend for OpenIdentity {
    async fn authenticate(&self, _user: &str, _public_key: &str, _repo: &str) -> Result<()> {
        Ok(())
    }
}

/// Checks GitHub collaborator push permission and a matching public key on
/// record for the user, against a single `owner` (spec §4.3).
#[derive(Debug, Clone)]
pub struct GithubCollaboratorIdentity {
    client: reqwest::Client,
    token: String,
    owner: String,
}

#[derive(Debug, Deserialize)]
struct PermissionResponse {
    permission: String,
}

#[derive(Debug, Deserialize)]
struct GithubKey {
    key: String,
}

impl GithubCollaboratorIdentity {
    pub fn new(token: String, owner: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("dockpack")
            .build()?;
        Ok(Self { client, token, owner })
    }

    async fn has_push_permission(&self, user: &str, repo: &str) -> Result<bool> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/collaborators/{}/permission",
            self.owner, repo, user
        );
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let body: PermissionResponse = resp.error_for_status()?.json().await?;
        Ok(body.permission == "admin" || body.permission == "write")
    }

    async fn has_matching_key(&self, user: &str, public_key: &str) -> Result<bool> {
        let url = format!("https://api.github.com/users/{user}/keys");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        let keys: Vec<GithubKey> = resp.error_for_status()?.json().await?;
        Ok(keys.iter().any(|k| k.key.trim_end() == public_key.trim_end()))
    }
}

#[async_trait::async_trait]
impl IdentityBackend for GithubCollaboratorIdentity {
    async fn authenticate(&self, user: &str, public_key: &str, repo: &str) -> Result<()> {
        if !self.has_matching_key(user, public_key).await? {
            return Err(CoreError::AuthDenied("permission denied (public key)".into()));
        }
        if !self.has_push_permission(user, repo).await? {
            return Err(CoreError::AuthDenied(format!(
                "not authorized to push on {repo}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_identity_always_accepts() {
        let backend = OpenIdentity;
        assert!(backend.authenticate("anyone", "ssh-ed25519 AAAA", "demo").await.is_ok());
    }
}
