use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::cli::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Clone,
    Open,
    Checkout,
    Resolve,
    Ancestor,
    Diff,
    Rebase,
    CherryPick,
    Remove,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Open => "open",
            Self::Checkout => "checkout",
            Self::Resolve => "resolve",
            Self::Ancestor => "ancestor",
            Self::Diff => "diff",
            Self::Rebase => "rebase",
            Self::CherryPick => "cherry_pick",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in a cherry-pick a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Worktree,
    Checkout,
    Commit,
    CommitObject,
    CheckoutPostCherryPick,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Worktree => "worktree",
            Self::Checkout => "checkout",
            Self::Commit => "commit",
            Self::CommitObject => "commit_object",
            Self::CheckoutPostCherryPick => "checkout_post_cherrypick",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Cause {
    #[error("repository already cloned")]
    AlreadyCloned,
    #[error("invalid branch name: {0}")]
    InvalidBranch(String),
    #[error("tokenized clone url unavailable: {0}")]
    Tokenization(String),
    #[error("not a repository")]
    NotARepository,
    #[error("bare repository has no worktree")]
    Bare,
    #[error("revision not found")]
    NotFound,
    #[error("object is a {0}, not a commit")]
    NotACommit(String),
    #[error("no common ancestor")]
    NoMergeBase,
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Repository(Box<RepositoryError>),
    #[error(transparent)]
    Resolve(Box<ResolveError>),
    #[error("{0}")]
    Backend(String),
}

impl From<RepositoryError> for Cause {
    fn from(value: RepositoryError) -> Self {
        Self::Repository(Box::new(value))
    }
}

impl From<ResolveError> for Cause {
    fn from(value: ResolveError) -> Self {
        Self::Resolve(Box::new(value))
    }
}

#[derive(Debug, Error)]
#[error("{op}: repo={repo_id} path={}: {cause}", .path.display())]
pub struct RepositoryError {
    pub op: Op,
    pub path: PathBuf,
    pub repo_id: String,
    #[source]
    pub cause: Cause,
}

#[derive(Debug, Error)]
#[error("{op}: repo={repo_id} ref={reference}: {cause}")]
pub struct ResolveError {
    pub op: Op,
    pub repo_id: String,
    pub reference: String,
    #[source]
    pub cause: Cause,
}

#[derive(Debug, Error)]
#[error("{op}: repo={repo_id} from={from} to={to}: {cause}")]
pub struct CompareError {
    pub op: Op,
    pub repo_id: String,
    pub from: String,
    pub to: String,
    #[source]
    pub cause: Cause,
}

#[derive(Debug, Error)]
#[error("cherry_pick({stage}): repo={repo_id} commit={commit}: {cause}")]
pub struct CherryPickError {
    pub stage: Stage,
    pub repo_id: String,
    pub commit: String,
    #[source]
    pub cause: Cause,
}

#[derive(Debug, Error)]
pub enum GitError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Compare(#[from] CompareError),
    #[error(transparent)]
    CherryPick(#[from] CherryPickError),
}

/// Builds a `Cause::Backend` from any displayable gix error, keeping the
/// context label in front.
pub(crate) fn backend<E: fmt::Display>(context: &'static str) -> impl FnOnce(E) -> Cause {
    move |err| Cause::Backend(format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_operation_identity_and_cause() {
        let err = RepositoryError {
            op: Op::Clone,
            path: PathBuf::from("/tmp/clone"),
            repo_id: "acme/widgets".to_string(),
            cause: Cause::AlreadyCloned,
        };
        assert_eq!(
            err.to_string(),
            "clone: repo=acme/widgets path=/tmp/clone: repository already cloned"
        );

        let err = CherryPickError {
            stage: Stage::CheckoutPostCherryPick,
            repo_id: "acme/widgets".to_string(),
            commit: "abc".to_string(),
            cause: Cause::NotFound,
        };
        assert_eq!(
            err.to_string(),
            "cherry_pick(checkout_post_cherrypick): repo=acme/widgets commit=abc: revision not found"
        );
    }

    #[test]
    fn umbrella_keeps_member_display() {
        let err: GitError = CompareError {
            op: Op::Ancestor,
            repo_id: "r".to_string(),
            from: "a".to_string(),
            to: "b".to_string(),
            cause: Cause::NoMergeBase,
        }
        .into();
        assert_eq!(err.to_string(), "ancestor: repo=r from=a to=b: no common ancestor");
    }
}
