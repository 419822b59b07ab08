use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic address of one durable instance.
///
/// Repo: `<prefix>.core.org.{org}.repo.{repo}.id.{repo_id}`; branch and trunk
/// instances extend the repo identity with `.branch.{branch}` and `.trunk`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn repo(prefix: &str, org: &str, repo: &str, repo_id: impl fmt::Display) -> Self {
        Self(format!("{prefix}.core.org.{org}.repo.{repo}.id.{repo_id}"))
    }

    #[must_use]
    pub fn branch(&self, branch: &str) -> Self {
        Self(format!("{}.branch.{branch}", self.0))
    }

    #[must_use]
    pub fn trunk(&self) -> Self {
        Self(format!("{}.trunk", self.0))
    }

    /// For identities minted outside this module, e.g. read back from storage.
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
