//! The I/O boundary of the workflows. Every function here is run through
//! `Context::execute_activity`, so it must be safe to call again after a
//! failed attempt.

use std::path::PathBuf;
use std::sync::Arc;

use bw_durable::ActivityError;
use bw_events::{Diff, Flat};
use bw_git::{Cause, CommandError, GitError, Op, RebaseResult, Repository, RepositoryError, Signature};
use tokio::sync::Mutex;

use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::types::FullRepo;

/// One session's clone: where it lives and whose it is.
///
/// Clones share `busy`. Git work holds it until the blocking thread returns,
/// so work abandoned by a timeout still finishes before the next attempt or
/// the removal touches the directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub path: PathBuf,
    pub repo_id: String,
    pub committer: Signature,
    busy: Arc<Mutex<()>>,
}

impl Workspace {
    pub fn new(path: PathBuf, repo: &FullRepo, committer: Signature) -> Self {
        Self {
            path,
            repo_id: repo.id.to_string(),
            committer,
            busy: Arc::new(Mutex::new(())),
        }
    }

    fn repository(&self) -> Repository {
        Repository::new(&self.path, &self.repo_id).with_committer(self.committer.clone())
    }
}

/// Clones the repository into the workspace with `branch` checked out at
/// `sha` (or at its tip when `sha` is empty). A failed attempt leaves no
/// directory behind; a clone left by an abandoned attempt is replaced.
pub async fn clone(
    kernel: Arc<Kernel>,
    repo: FullRepo,
    workspace: Workspace,
    branch: String,
    sha: String,
) -> Result<(), ActivityError> {
    let url = tokenized_url(&kernel, &repo, &workspace).await?;
    let target = workspace.clone();
    blocking(&workspace, "clone", move || {
        if target.path.exists() {
            tracing::debug!(path = %target.path.display(), "clone: replacing leftover clone");
            target.repository().remove()?;
        }
        let mut git = target.repository();
        let cloned = git
            .clone(&url, &branch)
            .and_then(|()| if sha.is_empty() { Ok(()) } else { git.checkout_at(&branch, &sha) });
        if let Err(err) = cloned {
            if let Err(cleanup) = git.remove() {
                tracing::warn!(error = %cleanup, "clone: cleanup failed");
            }
            return Err(err.into());
        }
        Ok(())
    })
    .await
}

async fn tokenized_url(
    kernel: &Kernel,
    repo: &FullRepo,
    workspace: &Workspace,
) -> Result<String, ActivityError> {
    let client = kernel.repo_hook(repo.hook).map_err(ActivityError::non_retryable)?;
    client
        .tokenized_clone_url(repo)
        .await
        .map_err(|err: KernelError| {
            ActivityError::retryable(RepositoryError {
                op: Op::Clone,
                path: workspace.path.clone(),
                repo_id: workspace.repo_id.clone(),
                cause: Cause::Tokenization(err.to_string()),
            })
        })
}

/// Diffs `base_branch` against `head` inside the workspace.
pub async fn diff(workspace: Workspace, base_branch: String, head: String) -> Result<Diff, ActivityError> {
    let target = workspace.clone();
    blocking(&workspace, "diff", move || {
        let mut git = target.repository();
        git.ensure_local_branch(&base_branch)?;
        Ok(git.diff(&base_branch, &head)?)
    })
    .await
}

/// Simulates replaying `base..head` onto `base`. `base_branch` is made local
/// first so `base` may name it.
pub async fn rebase(
    workspace: Workspace,
    base_branch: String,
    base: String,
    head: String,
) -> Result<RebaseResult, ActivityError> {
    let target = workspace.clone();
    blocking(&workspace, "rebase", move || {
        let mut git = target.repository();
        git.ensure_local_branch(&base_branch)?;
        Ok(git.rebase(&base, &head)?)
    })
    .await
}

pub async fn remove(workspace: Workspace) -> Result<(), ActivityError> {
    let target = workspace.clone();
    blocking(&workspace, "remove", move || Ok(target.repository().remove()?)).await
}

pub async fn persist(kernel: Arc<Kernel>, event: Flat) -> Result<(), ActivityError> {
    kernel
        .pulse()
        .persist(event)
        .await
        .map_err(ActivityError::retryable)
}

async fn blocking<T, F>(workspace: &Workspace, name: &'static str, work: F) -> Result<T, ActivityError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, GitError> + Send + 'static,
{
    let busy = workspace.busy.clone().lock_owned().await;
    let task = tokio::task::spawn_blocking(move || {
        let _busy = busy;
        work()
    });
    match task.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(classify(&err)),
        Err(join) => Err(ActivityError::non_retryable(format!("{name}: {join}"))),
    }
}

/// Failures of the git binary or the filesystem may pass; anything about the
/// inputs will not.
fn classify(err: &GitError) -> ActivityError {
    let cause = match err {
        GitError::Repository(err) => &err.cause,
        GitError::Resolve(err) => &err.cause,
        GitError::Compare(err) => &err.cause,
        GitError::CherryPick(err) => &err.cause,
    };
    match cause {
        Cause::Command(CommandError::Spawn { .. } | CommandError::Failed { .. }) | Cause::Io(_) => {
            ActivityError::retryable(err)
        }
        _ => ActivityError::non_retryable(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingRepoHook, RecordingPulse, full_repo};
    use crate::kernel::PassThroughRepoHook;
    use bw_events::RepoHook;
    use bw_git::testutil::GitTestRepo;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn kernel_with(hook: Arc<dyn crate::kernel::RepoHookClient>) -> Arc<Kernel> {
        Arc::new(Kernel::new(Arc::new(RecordingPulse::default())).with_repo_hook(RepoHook::Github, hook))
    }

    fn origin() -> GitTestRepo {
        let git = GitTestRepo::new().unwrap();
        git.write_file("a.txt", "one\n").unwrap();
        git.commit("base").unwrap();
        git.branch("feature").unwrap();
        git.write_file("a.txt", "one\ntwo\n").unwrap();
        git.commit("feature").unwrap();
        git.switch("main").unwrap();
        git
    }

    #[tokio::test]
    async fn clone_then_diff_against_default_branch() {
        let origin = origin();
        let repo = full_repo("widgets", &origin.url(), 10);
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("c"), &repo, Signature::default());
        let sha = origin.rev_parse("feature").unwrap();

        clone(kernel_with(Arc::new(PassThroughRepoHook)), repo, workspace.clone(), "feature".into(), sha.clone())
            .await
            .unwrap();
        let diff = diff(workspace.clone(), "main".into(), sha.clone()).await.unwrap();
        assert_eq!(diff.files.modified, vec!["a.txt".to_string()]);
        assert_eq!(diff.lines.added, 1);
        assert_eq!(diff.commits.head, sha);

        remove(workspace.clone()).await.unwrap();
        assert!(!workspace.path.exists());
    }

    #[tokio::test]
    async fn tokenization_failure_is_a_clone_error() {
        let repo = full_repo("widgets", "/nowhere", 10);
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("c"), &repo, Signature::default());

        let err = clone(kernel_with(Arc::new(FailingRepoHook)), repo, workspace.clone(), "main".into(), String::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("clone: "));
        assert!(err.to_string().contains("tokenized clone url unavailable"));
        assert!(!workspace.path.exists());
    }

    #[tokio::test]
    async fn failed_clone_leaves_nothing_behind() {
        let origin = origin();
        let repo = full_repo("widgets", &origin.url(), 10);
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("c"), &repo, Signature::default());

        let err = clone(
            kernel_with(Arc::new(PassThroughRepoHook)),
            repo,
            workspace.clone(),
            "feature".into(),
            "0123456789012345678901234567890123456789".into(),
        )
        .await
        .unwrap_err();
        assert!(err.is_retryable());
        assert!(!workspace.path.exists());
    }

    #[tokio::test]
    async fn abandoned_work_finishes_before_the_next_call() {
        let repo = full_repo("widgets", "/nowhere", 10);
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("c"), &repo, Signature::default());
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let slow = tokio::time::timeout(
            Duration::from_millis(20),
            blocking(&workspace, "slow", move || {
                std::thread::sleep(Duration::from_millis(200));
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
        )
        .await;
        assert!(slow.is_err());
        assert!(!finished.load(Ordering::SeqCst));

        let flag = finished.clone();
        let seen = blocking(&workspace, "next", move || Ok(flag.load(Ordering::SeqCst)))
            .await
            .unwrap();
        assert!(seen);
    }

    #[tokio::test]
    async fn clone_replaces_a_leftover_clone() {
        let origin = origin();
        let repo = full_repo("widgets", &origin.url(), 10);
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("c"), &repo, Signature::default());
        let kernel = kernel_with(Arc::new(PassThroughRepoHook));

        clone(kernel.clone(), repo.clone(), workspace.clone(), "main".into(), String::new())
            .await
            .unwrap();
        let sha = origin.rev_parse("feature").unwrap();
        clone(kernel, repo, workspace.clone(), "feature".into(), sha.clone())
            .await
            .unwrap();

        let diff = diff(workspace, "main".into(), sha).await.unwrap();
        assert_eq!(diff.lines.added, 1);
    }

    #[tokio::test]
    async fn invalid_input_is_not_retried() {
        let repo = full_repo("widgets", "/nowhere", 10);
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().to_path_buf(), &repo, Signature::default());
        let err = diff(workspace, "main".into(), "HEAD".into()).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unknown_repo_hook_is_not_retried() {
        let repo = full_repo("widgets", "/nowhere", 10);
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("c"), &repo, Signature::default());
        let kernel = Arc::new(Kernel::new(Arc::new(RecordingPulse::default())));
        let err = clone(kernel, repo, workspace, "main".into(), String::new())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
