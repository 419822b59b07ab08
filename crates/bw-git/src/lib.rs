//! Git operations over one local clone: clone/open, revision resolution,
//! diff and merge-base, rebase simulation and cherry-pick.
//!
//! Reads go through gix. Anything that writes refs, objects or worktrees
//! shells out to the git binary.

pub mod cherrypick;
pub mod cli;
pub mod diff;
pub mod error;
pub mod rebase;
pub mod refs;
pub mod repository;
pub mod resolve;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use crate::cli::{CommandError, Signature};
pub use crate::error::{
    Cause, CherryPickError, CompareError, GitError, Op, RepositoryError, ResolveError, Stage,
};
pub use crate::rebase::{RebaseKind, RebaseOperation, RebaseResult, RebaseStatus};
pub use crate::repository::Repository;
pub use crate::resolve::CommitInfo;
