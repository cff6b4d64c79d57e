//! Repository workspace (C4): owns the on-disk bare-repo tree and the
//! per-repo lock marker.
//!
//! Grounded on `original_source/server.go`'s `createRepoIfNeeded`/
//! `lockRepo`/`unlockRepo`, and on the teacher's `git_store.rs` for the
//! git2-based repository-creation idiom. The lock marker here uses an
//! atomic exclusive create rather than the original's racy `Stat`-then-
//! `Create`, per the re-architecture note in spec §9.

use std::path::{Path, PathBuf};

use git2::Repository;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::hook::HookConfig;
use crate::types::RepoName;

const LOCK_FILE: &str = ".dockpack_lock";

/// Owns `workspace_dir` and the repo/lock/hook operations rooted there.
#[derive(Debug, Clone)]
pub struct RepoWorkspace {
    root: PathBuf,
}

impl RepoWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of `repo`'s bare Git directory under the workspace.
    pub fn repo_path(&self, repo: &RepoName) -> PathBuf {
        self.root.join(repo.as_str())
    }

    /// Path of the transient source tarball for one push.
    pub fn tar_path(&self, repo: &RepoName, git_ref: &str) -> PathBuf {
        self.root.join(format!("{repo}_{git_ref}.tar"))
    }

    /// Path of the cross-build cache tarball, keyed by repo alone.
    pub fn cache_tar_path(&self, repo: &RepoName) -> PathBuf {
        self.root.join(format!("{repo}_cache.tar"))
    }

    /// Path of the most recent build log, tee'd there by the hook.
    pub fn log_path(&self, repo: &RepoName) -> PathBuf {
        self.root.join(format!("{repo}.log"))
    }

    fn lock_path(&self, repo: &RepoName) -> PathBuf {
        self.repo_path(repo).join(LOCK_FILE)
    }

    /// `ensure(repo) -> absolute_path`: initialise a bare repo on first
    /// push, otherwise return the existing path unchanged.
    pub async fn ensure(&self, repo: &RepoName) -> Result<PathBuf> {
        let path = self.repo_path(repo);
        if path.exists() {
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let path_for_init = path.clone();
        tokio::task::spawn_blocking(move || Repository::init_bare(&path_for_init))
            .await
            .map_err(|e| CoreError::Setup(format!("init task panicked: {e}")))??;

        info!(repo = %repo, path = %path.display(), "initialised bare repository");
        Ok(path)
    }

    /// `lock(repo) -> ok | busy`. Atomic: the marker file is created with
    /// `O_EXCL` semantics so two concurrent pushes racing on the same repo
    /// cannot both observe "absent".
    pub async fn lock(&self, repo: &RepoName) -> Result<()> {
        let lock_path = self.lock_path(repo);
        let lock_path_for_create = lock_path.clone();
        let created = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path_for_create)
        })
        .await
        .map_err(|e| CoreError::Setup(format!("lock task panicked: {e}")))?;

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(CoreError::RepoBusy),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    /// `unlock(repo)`: remove the marker. Absence is not an error — this
    /// must be safe to call on every exit path, including ones where
    /// `lock` never succeeded.
    pub async fn unlock(&self, repo: &RepoName) {
        let lock_path = self.lock_path(repo);
        if let Err(e) = tokio::fs::remove_file(&lock_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(repo = %repo, error = %e, "unable to remove lock marker");
            }
        }
    }

    pub fn is_locked(&self, repo: &RepoName) -> bool {
        self.lock_path(repo).exists()
    }

    /// `prepareRepo`: ensure -> lock -> install hook. If hook installation
    /// fails the repo is unlocked before returning, per spec §4.4.
    pub async fn prepare_repo(&self, repo: &RepoName, hook_config: &HookConfig) -> Result<PathBuf> {
        let path = self.ensure(repo).await?;
        self.lock(repo).await?;

        if let Err(e) = crate::hook::install(&path, repo, hook_config).await {
            self.unlock(repo).await;
            return Err(e);
        }

        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::hook::HookConfig;
    use std::sync::Arc;

    fn hook_config(workspace_dir: &Path) -> HookConfig {
        HookConfig {
            internal_port: 9000,
            workspace_dir: workspace_dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn ensure_initialises_a_bare_repo_once() {
        let dir = tempfile::tempdir().unwrap();
        let ws = RepoWorkspace::new(dir.path());
        let repo = RepoName::parse("demo").unwrap();

        let path = ws.ensure(&repo).await.unwrap();
        assert!(path.join("HEAD").exists());

        // Second call is a no-op, not a re-init error.
        let path2 = ws.ensure(&repo).await.unwrap();
        assert_eq!(path, path2);
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let ws = RepoWorkspace::new(dir.path());
        let repo = RepoName::parse("demo").unwrap();
        ws.ensure(&repo).await.unwrap();

        ws.lock(&repo).await.unwrap();
        assert!(matches!(ws.lock(&repo).await, Err(CoreError::RepoBusy)));

        ws.unlock(&repo).await;
        assert!(ws.lock(&repo).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_lock_attempts_admit_exactly_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(RepoWorkspace::new(dir.path()));
        let repo = RepoName::parse("demo").unwrap();
        ws.ensure(&repo).await.unwrap();

        let racers: Vec<_> = (0..8)
            .map(|_| {
                let ws = ws.clone();
                let repo = repo.clone();
                tokio::spawn(async move { ws.lock(&repo).await.is_ok() })
            })
            .collect();

        let mut wins = 0;
        for racer in racers {
            if racer.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1, "exactly one concurrent locker should win");
    }

    #[tokio::test]
    async fn unlock_without_prior_lock_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = RepoWorkspace::new(dir.path());
        let repo = RepoName::parse("demo").unwrap();
        ws.ensure(&repo).await.unwrap();
        ws.unlock(&repo).await; // does not panic
    }

    #[tokio::test]
    async fn prepare_repo_composes_ensure_lock_and_hook_install() {
        let dir = tempfile::tempdir().unwrap();
        let ws = RepoWorkspace::new(dir.path());
        let repo = RepoName::parse("demo").unwrap();

        let path = ws.prepare_repo(&repo, &hook_config(dir.path())).await.unwrap();
        assert!(path.join("hooks").join("pre-receive").exists());
        assert!(ws.is_locked(&repo));
    }
}
