use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub committer: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Push {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub before: String,
    pub after: String,
    pub repository: String,
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub commits: Vec<Commit>,
    pub timestamp: DateTime<Utc>,
}

impl Push {
    /// The most recent commit of the push, by commit timestamp.
    pub fn latest_commit(&self) -> Option<&Commit> {
        self.commits.iter().max_by_key(|commit| commit.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Branch,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchOrTag {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub kind: RefKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rebase {
    pub base: String,
    pub head: String,
    pub repository: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFiles {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub modified: Vec<String>,
    pub renamed: Vec<String>,
}

impl DiffFiles {
    pub fn count(&self) -> usize {
        self.added.len() + self.deleted.len() + self.modified.len() + self.renamed.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLines {
    pub added: i32,
    pub removed: i32,
}

impl DiffLines {
    pub fn sum(&self) -> i32 {
        self.added.saturating_add(self.removed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCommits {
    pub base: String,
    pub head: String,
    /// Merge-base of `base` and `head`; empty when none was found.
    #[serde(default)]
    pub conflict_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub files: DiffFiles,
    pub lines: DiffLines,
    pub commits: DiffCommits,
    pub patch: String,
    pub has_conflict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: i64,
    pub title: String,
    pub branch: String,
    pub base_branch: String,
    #[serde(default)]
    pub author_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestLabel {
    pub name: String,
    pub number: i64,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinesExceed {
    pub branch: String,
    pub lines: DiffLines,
    pub threshold: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub head_branch: String,
    pub base_branch: String,
    pub head: String,
    pub conflicts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Push,
    BranchOrTag,
    Rebase,
    Diff,
    PullRequest,
    PullRequestLabel,
    LinesExceed,
    MergeConflict,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Push => "push",
            Self::BranchOrTag => "branch_or_tag",
            Self::Rebase => "rebase",
            Self::Diff => "diff",
            Self::PullRequest => "pull_request",
            Self::PullRequestLabel => "pull_request_label",
            Self::LinesExceed => "lines_exceed",
            Self::MergeConflict => "merge_conflict",
        };
        f.write_str(name)
    }
}

/// The closed set of payloads an event can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AnyPayload {
    Push(Push),
    BranchOrTag(BranchOrTag),
    Rebase(Rebase),
    Diff(Diff),
    PullRequest(PullRequest),
    PullRequestLabel(PullRequestLabel),
    LinesExceed(LinesExceed),
    MergeConflict(MergeConflict),
}

mod sealed {
    pub trait Sealed {}
}

/// Implemented only by the payload types of this module, so an `Event<P>`
/// can never carry anything outside the closed set.
pub trait Payload:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static + sealed::Sealed
{
    fn kind(&self) -> PayloadKind;
    fn into_any(self) -> AnyPayload;
    fn from_any(any: AnyPayload) -> Option<Self>;
}

macro_rules! payload_type {
    ($name:ident) => {
        impl sealed::Sealed for $name {}

        impl Payload for $name {
            fn kind(&self) -> PayloadKind {
                PayloadKind::$name
            }

            fn into_any(self) -> AnyPayload {
                AnyPayload::$name(self)
            }

            fn from_any(any: AnyPayload) -> Option<Self> {
                match any {
                    AnyPayload::$name(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

payload_type!(Push);
payload_type!(BranchOrTag);
payload_type!(Rebase);
payload_type!(Diff);
payload_type!(PullRequest);
payload_type!(PullRequestLabel);
payload_type!(LinesExceed);
payload_type!(MergeConflict);

impl sealed::Sealed for AnyPayload {}

impl Payload for AnyPayload {
    fn kind(&self) -> PayloadKind {
        match self {
            Self::Push(_) => PayloadKind::Push,
            Self::BranchOrTag(_) => PayloadKind::BranchOrTag,
            Self::Rebase(_) => PayloadKind::Rebase,
            Self::Diff(_) => PayloadKind::Diff,
            Self::PullRequest(_) => PayloadKind::PullRequest,
            Self::PullRequestLabel(_) => PayloadKind::PullRequestLabel,
            Self::LinesExceed(_) => PayloadKind::LinesExceed,
            Self::MergeConflict(_) => PayloadKind::MergeConflict,
        }
    }

    fn into_any(self) -> AnyPayload {
        self
    }

    fn from_any(any: AnyPayload) -> Option<Self> {
        Some(any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit(sha: &str, secs: i64) -> Commit {
        Commit {
            sha: sha.to_string(),
            message: format!("commit {sha}"),
            url: String::new(),
            added: vec![],
            removed: vec![],
            modified: vec![],
            author: "dev".to_string(),
            committer: "dev".to_string(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn latest_commit_picks_newest_timestamp() {
        let push = Push {
            git_ref: "refs/heads/feature".to_string(),
            before: "a".to_string(),
            after: "c".to_string(),
            repository: "acme/widgets".to_string(),
            sender_id: None,
            commits: vec![commit("b", 20), commit("c", 30), commit("a", 10)],
            timestamp: Utc::now(),
        };
        assert_eq!(push.latest_commit().map(|c| c.sha.as_str()), Some("c"));
    }

    #[test]
    fn diff_lines_sum() {
        let lines = DiffLines {
            added: 3,
            removed: 1,
        };
        assert_eq!(lines.sum(), 4);
    }

    #[test]
    fn any_payload_downcasts_only_to_its_variant() {
        let any = Rebase {
            base: "main".to_string(),
            head: "abc".to_string(),
            repository: "acme/widgets".to_string(),
        }
        .into_any();
        assert_eq!(any.kind(), PayloadKind::Rebase);
        assert!(Push::from_any(any.clone()).is_none());
        assert_eq!(Rebase::from_any(any).map(|r| r.head), Some("abc".to_string()));
    }

    #[test]
    fn push_uses_ref_on_the_wire() {
        let json = serde_json::json!({
            "ref": "refs/heads/main",
            "before": "0",
            "after": "1",
            "repository": "acme/widgets",
            "timestamp": "2024-01-01T00:00:00Z"
        });
        let push: Push = serde_json::from_value(json).unwrap();
        assert_eq!(push.git_ref, "refs/heads/main");
        assert!(push.commits.is_empty());
    }
}
