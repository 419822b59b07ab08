use std::path::{Path, PathBuf};

use crate::cli::{Git, Signature};
use crate::error::{Cause, Op, RepositoryError};
use crate::refs;

pub const DEFAULT_REMOTE: &str = "origin";

/// One local clone at one path. Every git operation of the engine goes
/// through a `Repository`.
pub struct Repository {
    path: PathBuf,
    repo_id: String,
    committer: Signature,
    handle: Option<gix::Repository>,
}

impl Repository {
    pub fn new(path: impl Into<PathBuf>, repo_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            repo_id: repo_id.into(),
            committer: Signature::default(),
            handle: None,
        }
    }

    #[must_use]
    pub fn with_committer(mut self, committer: Signature) -> Self {
        self.committer = committer;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn committer(&self) -> &Signature {
        &self.committer
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn error(&self, op: Op, cause: impl Into<Cause>) -> RepositoryError {
        RepositoryError {
            op,
            path: self.path.clone(),
            repo_id: self.repo_id.clone(),
            cause: cause.into(),
        }
    }

    pub(crate) fn git(&self) -> Git {
        Git::new(&self.path)
    }

    /// Clones `url` into this repository's path and checks out `branch`.
    ///
    /// Fails when the path already holds a repository, when `branch` is not a
    /// valid branch name, or when git cannot clone.
    pub fn clone(&mut self, url: &str, branch: &str) -> Result<(), RepositoryError> {
        if self.handle.is_some() || self.path.join(".git").exists() {
            return Err(self.error(Op::Clone, Cause::AlreadyCloned));
        }
        validate_branch(branch).map_err(|cause| self.error(Op::Clone, cause))?;

        let parent = self
            .path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        std::fs::create_dir_all(&parent).map_err(|err| self.error(Op::Clone, err))?;

        Git::new(&parent)
            .args(["clone", "--quiet", "--no-tags", "--branch", branch, url])
            .arg(self.path.to_string_lossy())
            .run()
            .map_err(|err| self.error(Op::Clone, err))?;

        tracing::debug!(repo = %self.repo_id, path = %self.path.display(), branch, "cloned");
        self.open().map(|_| ())
    }

    /// Opens the repository at `path`. Calling it again reuses the open handle.
    pub fn open(&mut self) -> Result<&gix::Repository, RepositoryError> {
        if self.handle.is_none() {
            let repo = gix::open(&self.path)
                .map_err(|_| self.error(Op::Open, Cause::NotARepository))?;
            self.handle = Some(repo);
        }
        self.handle
            .as_ref()
            .ok_or_else(|| self.error(Op::Open, Cause::NotARepository))
    }

    /// A cloned handle to the open repository, opening it first if needed.
    pub(crate) fn handle(&mut self) -> Result<gix::Repository, RepositoryError> {
        self.open().cloned()
    }

    pub(crate) fn workdir(&mut self) -> Result<PathBuf, RepositoryError> {
        let repo = self.handle()?;
        repo.workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| self.error(Op::Open, Cause::Bare))
    }

    /// Points the worktree at `rev` (branch name or commit).
    pub fn checkout(&mut self, rev: &str) -> Result<(), RepositoryError> {
        self.open()?;
        self.git()
            .args(["checkout", "--quiet", "--force", rev])
            .run()
            .map_err(|err| self.error(Op::Checkout, err))?;
        Ok(())
    }

    /// Moves `branch` to `rev` and checks it out, creating the branch if needed.
    pub fn checkout_at(&mut self, branch: &str, rev: &str) -> Result<(), RepositoryError> {
        self.open()?;
        self.git()
            .args(["checkout", "--quiet", "--force", "-B", branch, rev])
            .run()
            .map_err(|err| self.error(Op::Checkout, err))?;
        Ok(())
    }

    /// Makes `branch` available as a local branch, tracking the remote one
    /// when only the remote copy exists.
    pub fn ensure_local_branch(&mut self, branch: &str) -> Result<(), RepositoryError> {
        let repo = self.handle()?;
        let local = refs::branch_name_to_ref(branch);
        if repo.find_reference(local.as_str()).is_ok() {
            return Ok(());
        }
        let remote = refs::branch_name_to_remote_ref(DEFAULT_REMOTE, branch);
        if repo.find_reference(remote.as_str()).is_err() {
            return Err(self.error(Op::Checkout, Cause::InvalidBranch(branch.to_string())));
        }
        self.git()
            .args(["branch", "--quiet", "--track", branch])
            .arg(remote)
            .run()
            .map_err(|err| self.error(Op::Checkout, err))?;
        Ok(())
    }

    /// Deletes the clone from disk.
    pub fn remove(mut self) -> Result<(), RepositoryError> {
        self.handle = None;
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.error(Op::Remove, err)),
        }
    }
}

fn validate_branch(branch: &str) -> Result<(), Cause> {
    let invalid = || Cause::InvalidBranch(branch.to_string());
    if branch.is_empty() || branch.starts_with('-') {
        return Err(invalid());
    }
    let output = Git::new(Path::new("."))
        .args(["check-ref-format", "--branch", branch])
        .output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::GitTestRepo;

    #[test]
    fn clone_and_open() {
        let origin = GitTestRepo::new().unwrap();
        origin.write_file("README.md", "hello\n").unwrap();
        origin.commit("initial").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let mut repo = Repository::new(dest.path().join("clone"), "acme/widgets");
        repo.clone(&origin.url(), "main").unwrap();
        assert!(repo.is_open());
        assert!(repo.path().join("README.md").exists());

        // idempotent
        repo.open().unwrap();
        repo.open().unwrap();
    }

    #[test]
    fn clone_twice_is_rejected() {
        let origin = GitTestRepo::new().unwrap();
        origin.commit("initial").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let mut repo = Repository::new(dest.path().join("clone"), "acme/widgets");
        repo.clone(&origin.url(), "main").unwrap();
        let err = repo.clone(&origin.url(), "main").unwrap_err();
        assert_eq!(err.op, Op::Clone);
        assert!(matches!(err.cause, Cause::AlreadyCloned));
    }

    #[test]
    fn clone_rejects_invalid_branch() {
        let origin = GitTestRepo::new().unwrap();
        origin.commit("initial").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let mut repo = Repository::new(dest.path().join("clone"), "acme/widgets");
        let err = repo.clone(&origin.url(), "bad..name").unwrap_err();
        assert!(matches!(err.cause, Cause::InvalidBranch(_)));
        assert!(!repo.path().exists());
    }

    #[test]
    fn clone_of_missing_branch_fails() {
        let origin = GitTestRepo::new().unwrap();
        origin.commit("initial").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let mut repo = Repository::new(dest.path().join("clone"), "acme/widgets");
        let err = repo.clone(&origin.url(), "does-not-exist").unwrap_err();
        assert_eq!(err.op, Op::Clone);
        assert!(matches!(err.cause, Cause::Command(_)));
    }

    #[test]
    fn open_non_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::new(dir.path(), "acme/widgets");
        let err = repo.open().unwrap_err();
        assert_eq!(err.op, Op::Open);
        assert!(matches!(err.cause, Cause::NotARepository));
    }

    #[test]
    fn ensure_local_branch_tracks_remote() {
        let origin = GitTestRepo::new().unwrap();
        origin.commit("initial").unwrap();
        origin.branch("feature").unwrap();
        origin.write_file("f.txt", "feature\n").unwrap();
        origin.commit("feature work").unwrap();
        origin.switch("main").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let mut repo = Repository::new(dest.path().join("clone"), "acme/widgets");
        repo.clone(&origin.url(), "feature").unwrap();
        repo.ensure_local_branch("main").unwrap();
        repo.ensure_local_branch("main").unwrap();
        assert!(repo.resolve_commit("main").is_ok());

        let err = repo.ensure_local_branch("nope").unwrap_err();
        assert!(matches!(err.cause, Cause::InvalidBranch(_)));
    }

    #[test]
    fn remove_deletes_clone() {
        let origin = GitTestRepo::new().unwrap();
        origin.commit("initial").unwrap();
        let dest = tempfile::tempdir().unwrap();
        let path = dest.path().join("clone");
        let mut repo = Repository::new(&path, "acme/widgets");
        repo.clone(&origin.url(), "main").unwrap();
        repo.remove().unwrap();
        assert!(!path.exists());
    }
}
