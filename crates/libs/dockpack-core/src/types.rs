//! Shared domain types (spec §3 Data Model): the validated repository
//! name, the transient push request, the build result and the Procfile
//! mapping. These live in dockpack-core so dockpack-docker and
//! dockpack-server can both depend on them without depending on each
//! other.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A repository name, validated at construction.
///
/// Spec §9 flags that the original server never sanitises `repo`: a user
/// pushing `../../etc/passwd.git` would escape the workspace. This newtype
/// makes that state unrepresentable — any path separator, `..` component,
/// NUL byte, or leading dot is rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoName(String);

impl RepoName {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(CoreError::InvalidRepoName("empty repository name".into()));
        }
        if raw.contains('/')
            || raw.contains('\\')
            || raw.contains('\0')
            || raw.starts_with('.')
            || raw.split('/').any(|segment| segment == "..")
        {
            return Err(CoreError::InvalidRepoName(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The hook's callback payload: `PUT {"repo", "ref"}` (spec §6 internal
/// HTTP endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub repo: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

/// One parsed `Procfile` line, `name:command` split on the first colon
/// with the command kept verbatim (leading whitespace included — spec §9
/// open question, resolved in DESIGN.md to preserve it).
pub type Procfile = BTreeMap<String, String>;

/// Parse Procfile contents into a process-name -> command-line map.
/// Non-empty lines only; a line without a colon is skipped. Best-effort:
/// callers treat a missing or malformed Procfile as "no procfile", not an
/// error.
pub fn parse_procfile(contents: &str) -> Procfile {
    let mut map = BTreeMap::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some((name, command)) = line.split_once(':') {
            map.insert(name.to_string(), command.to_string());
        }
    }
    map
}

/// `BuildResult{repo, image_name, image_tag, procfile?}` (spec §3). Also
/// the webhook payload body (spec §6): `procfile` is only serialised when
/// non-empty, matching the "unknown keys are never sent" testable
/// property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    pub repo: String,
    pub image_name: String,
    pub image_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procfile: Option<Procfile>,
}

/// `<unix_seconds>_<ref>` image tag (spec §3): lexicographically
/// increasing within one repo as long as the pushes are spaced at least a
/// second apart and the decimal width of the timestamp doesn't change
/// (flagged, not fixed, per spec §9).
pub fn image_tag(unix_seconds: i64, git_ref: &str) -> String {
    format!("{unix_seconds}_{git_ref}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_plain_name() {
        assert!(RepoName::parse("demo").is_ok());
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(RepoName::parse("../../etc/passwd").is_err());
        assert!(RepoName::parse("foo/../bar").is_err());
        assert!(RepoName::parse("a/b").is_err());
        assert!(RepoName::parse(".hidden").is_err());
        assert!(RepoName::parse("").is_err());
    }

    #[test]
    fn procfile_split_on_first_colon_keeps_leading_space() {
        let procfile = parse_procfile("web: bundle exec rackup\nworker: ruby worker.rb\n");
        assert_eq!(procfile.get("web").unwrap(), " bundle exec rackup");
        assert_eq!(procfile.get("worker").unwrap(), " ruby worker.rb");
    }

    #[test]
    fn procfile_ignores_blank_lines_and_lines_without_colon() {
        let procfile = parse_procfile("\nweb rackup\nworker: ruby worker.rb\n");
        assert_eq!(procfile.len(), 1);
    }

    #[test]
    fn build_result_omits_procfile_key_when_absent() {
        let result = BuildResult {
            repo: "demo".into(),
            image_name: "dockpack/demo".into(),
            image_tag: "1_abc123".into(),
            procfile: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.as_object().unwrap().get("procfile").is_none());
    }

    #[test]
    fn image_tag_is_strictly_increasing_across_seconds() {
        let a = image_tag(1000, "abc123");
        let b = image_tag(1001, "abc123");
        assert!(a < b);
    }
}
