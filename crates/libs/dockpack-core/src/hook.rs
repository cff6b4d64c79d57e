//! Hook template (C5): renders and installs the `pre-receive` script.
//!
//! Grounded on `original_source/server.go::injectPreReceiveHook`, which
//! used Go's `text/template`. The script has no loops or conditionals
//! beyond what's already inline in the shell, so this rendition uses plain
//! string substitution rather than pulling in a templating crate — the
//! teacher's own code reaches for `format!`/string-building for equally
//! simple cases and saves templating engines for actual document
//! generation.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::RepoName;

pub const BUILD_ERROR_PREFIX: &str = "BUILD ERROR";

/// Everything the rendered script needs to know, regenerated fresh at
/// every push because the internal HTTP port is chosen per process
/// lifetime (spec §4.5).
#[derive(Debug, Clone)]
pub struct HookConfig {
    pub internal_port: u16,
    pub workspace_dir: PathBuf,
}

/// Render the `pre-receive` script body for `repo`.
///
/// Only `refs/heads/master` triggers the archive-and-build sequence; any
/// other ref is silently accepted by the hook (and thus by
/// `git-receive-pack`), per spec §4.5.
pub fn render(repo: &RepoName, config: &HookConfig) -> String {
    let workspace = config.workspace_dir.display();
    let endpoint = format!("localhost:{}", config.internal_port);
    let build_log = config.workspace_dir.join(format!("{repo}.log"));

    format!(
        r#"#!/bin/sh
set -e
while read old_ref new_ref ref_name
do
  if [ "$ref_name" = "refs/heads/master" ]; then
    git archive -o {workspace}/{repo}_$new_ref.tar $new_ref
    curl -N -s -m 3600 -X PUT -H 'Content-Type: application/json' \
      -d "{{\"repo\": \"{repo}\", \"ref\": \"$new_ref\"}}" {endpoint} | tee {build_log}
    if grep -q "{prefix}" {build_log} ; then
      exit 1
    fi
  fi
done

exit 0
"#,
        workspace = workspace,
        repo = repo,
        endpoint = endpoint,
        build_log = build_log.display(),
        prefix = BUILD_ERROR_PREFIX,
    )
}

/// Install (or reinstall) the `pre-receive` hook inside `repo_path`'s
/// `hooks/` directory, mode `0777` per spec §4.5.
pub async fn install(repo_path: &Path, repo: &RepoName, config: &HookConfig) -> Result<()> {
    let hook_path = repo_path.join("hooks").join("pre-receive");
    let script = render(repo, config);

    tokio::fs::write(&hook_path, script).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o777);
        tokio::fs::set_permissions(&hook_path, perms).await?;
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn renders_only_master_branch_guard() {
        let repo = RepoName::parse("demo").unwrap();
        let config = HookConfig {
            internal_port: 12345,
            workspace_dir: PathBuf::from("/srv/dockpack"),
        };
        let script = render(&repo, &config);
        assert!(script.contains("refs/heads/master"));
        assert!(script.contains("localhost:12345"));
        assert!(script.contains(BUILD_ERROR_PREFIX));
        assert!(script.contains("demo_$new_ref.tar"));
    }

    #[tokio::test]
    async fn install_writes_executable_script() {
        let dir = tempfile::tempdir().unwrap();
        let hooks_dir = dir.path().join("hooks");
        tokio::fs::create_dir_all(&hooks_dir).await.unwrap();

        let repo = RepoName::parse("demo").unwrap();
        let config = HookConfig {
            internal_port: 9999,
            workspace_dir: dir.path().to_path_buf(),
        };

        install(dir.path(), &repo, &config).await.unwrap();

        let hook_path = hooks_dir.join("pre-receive");
        assert!(hook_path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = tokio::fs::metadata(&hook_path).await.unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o777);
        }
    }
}
