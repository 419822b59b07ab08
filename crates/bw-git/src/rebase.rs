use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::cli::{CommandError, Git};
use crate::error::{Cause, CompareError, Op};
use crate::repository::Repository;

/// Outcome of a rebase or of one replayed commit. Ordered from best to
/// worst; an aggregate only ever moves toward `Failure`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RebaseStatus {
    #[default]
    UpToDate,
    Success,
    Partial,
    Conflicts,
    Aborted,
    Failure,
}

impl fmt::Display for RebaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UpToDate => "up_to_date",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Conflicts => "conflicts",
            Self::Aborted => "aborted",
            Self::Failure => "failure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaseKind {
    Pick,
    Reword,
    Edit,
    Squash,
    Fixup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseOperation {
    pub kind: RebaseKind,
    pub status: RebaseStatus,
    /// The replayed commit.
    pub head: String,
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseResult {
    /// Tip after replaying every commit that applied cleanly.
    pub head: String,
    pub status: RebaseStatus,
    pub conflicts: Vec<String>,
    pub operations: Vec<RebaseOperation>,
}

impl RebaseResult {
    pub fn new(head: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            status: RebaseStatus::UpToDate,
            conflicts: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Raises the aggregate status; never lowers it.
    pub fn degrade(&mut self, status: RebaseStatus) {
        self.status = self.status.max(status);
    }

    pub fn add_operation(&mut self, operation: RebaseOperation) {
        let status = if operation.error.is_some() && operation.status <= RebaseStatus::Success {
            RebaseStatus::Failure
        } else {
            operation.status
        };
        self.degrade(status);
        self.operations.push(operation);
    }

    pub fn add_conflicts<I: IntoIterator<Item = String>>(&mut self, paths: I) {
        for path in paths {
            if !self.conflicts.contains(&path) {
                self.conflicts.push(path);
            }
        }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

impl Repository {
    fn rebase_error(&self, base: &str, head: &str, cause: impl Into<Cause>) -> CompareError {
        CompareError {
            op: Op::Rebase,
            repo_id: self.repo_id().to_string(),
            from: base.to_string(),
            to: head.to_string(),
            cause: cause.into(),
        }
    }

    /// Simulates replaying `base..head` onto `base`, one pick per commit, in a
    /// throwaway worktree. The caller's checkout is left untouched.
    ///
    /// Commits that conflict are recorded and skipped; merge commits are
    /// skipped and mark the result partial.
    pub fn rebase(&mut self, base: &str, head: &str) -> Result<RebaseResult, CompareError> {
        let base_info = self
            .resolve_commit(base)
            .map_err(|err| self.rebase_error(base, head, err))?;
        let head_info = self
            .resolve_commit(head)
            .map_err(|err| self.rebase_error(base, head, err))?;

        let range = format!("{}..{}", base_info.id, head_info.id);
        let listing = self
            .git()
            .args(["rev-list", "--reverse", "--parents", range.as_str()])
            .run()
            .map_err(|err| self.rebase_error(base, head, err))?;

        let mut result = RebaseResult::new(base_info.id.clone());
        if listing.is_empty() {
            return Ok(result);
        }

        let worktree = SimulationWorktree::create(self, &base_info.id)
            .map_err(|cause| self.rebase_error(base, head, cause))?;
        for line in listing.lines() {
            let mut ids = line.split_whitespace();
            let Some(commit) = ids.next() else {
                continue;
            };
            let operation = replay(self, &worktree, commit, ids.count());
            if operation.status == RebaseStatus::Conflicts {
                result.add_conflicts(worktree.conflicted_paths());
            }
            if matches!(
                operation.status,
                RebaseStatus::Conflicts | RebaseStatus::Failure
            ) {
                worktree
                    .reset()
                    .map_err(|err| self.rebase_error(base, head, err))?;
            }
            result.add_operation(operation);
        }

        result.head = worktree
            .git()
            .args(["rev-parse", "HEAD"])
            .run()
            .map_err(|err| self.rebase_error(base, head, err))?;

        tracing::debug!(
            repo = %self.repo_id(),
            base,
            head,
            status = %result.status,
            conflicts = result.conflicts.len(),
            "rebase simulated"
        );
        Ok(result)
    }
}

fn replay(
    repo: &Repository,
    worktree: &SimulationWorktree,
    commit: &str,
    parents: usize,
) -> RebaseOperation {
    let mut operation = RebaseOperation {
        kind: RebaseKind::Pick,
        status: RebaseStatus::Success,
        head: commit.to_string(),
        message: String::new(),
        error: None,
    };
    match worktree
        .git()
        .args(["log", "-1", "--format=%s", commit])
        .run()
    {
        Ok(message) => operation.message = message,
        Err(err) => {
            operation.status = RebaseStatus::Failure;
            operation.error = Some(err.to_string());
            return operation;
        }
    }

    if parents > 1 {
        operation.status = RebaseStatus::Partial;
        operation.error = Some("merge commit skipped".to_string());
        return operation;
    }

    let output = worktree
        .git()
        .as_committer(repo.committer())
        .args([
            "cherry-pick",
            "--allow-empty",
            "--keep-redundant-commits",
            commit,
        ])
        .output();
    match output {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            operation.status = if worktree.conflicted_paths().is_empty() {
                RebaseStatus::Failure
            } else {
                RebaseStatus::Conflicts
            };
            operation.error = Some(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Err(err) => {
            operation.status = RebaseStatus::Failure;
            operation.error = Some(err.to_string());
        }
    }
    operation
}

/// Detached worktree inside the clone's git dir, so it never outlives the
/// clone. Removed on drop.
struct SimulationWorktree {
    owner: PathBuf,
    path: PathBuf,
}

impl SimulationWorktree {
    fn create(repo: &mut Repository, base: &str) -> Result<Self, Cause> {
        repo.open()?;
        let git_dir = repo.git().args(["rev-parse", "--absolute-git-dir"]).run()?;
        let path = PathBuf::from(git_dir)
            .join("bw-rebase")
            .join(uuid::Uuid::new_v4().to_string());
        repo.git()
            .args(["worktree", "add", "--quiet", "--detach"])
            .arg(path.to_string_lossy())
            .arg(base)
            .run()?;
        Ok(Self {
            owner: repo.path().to_path_buf(),
            path,
        })
    }

    fn git(&self) -> Git {
        Git::new(&self.path)
    }

    /// Drops a failed pick: clears the sequencer state and restores the index
    /// and files to the last replayed commit.
    fn reset(&self) -> Result<(), CommandError> {
        self.git().args(["cherry-pick", "--quit"]).run()?;
        self.git().args(["reset", "--hard", "--quiet", "HEAD"]).run()?;
        Ok(())
    }

    fn conflicted_paths(&self) -> Vec<String> {
        self.git()
            .args(["diff", "--name-only", "--diff-filter=U"])
            .run()
            .map(|stdout| {
                stdout
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Drop for SimulationWorktree {
    fn drop(&mut self) {
        let removed = Git::new(&self.owner)
            .args(["worktree", "remove", "--force"])
            .arg(self.path.to_string_lossy())
            .run();
        if let Err(err) = removed {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to remove rebase worktree");
            let _ = std::fs::remove_dir_all(&self.path);
            let _ = Git::new(&self.owner).args(["worktree", "prune"]).run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::GitTestRepo;

    fn op(status: RebaseStatus, error: Option<&str>) -> RebaseOperation {
        RebaseOperation {
            kind: RebaseKind::Pick,
            status,
            head: "abc".to_string(),
            message: "m".to_string(),
            error: error.map(ToString::to_string),
        }
    }

    #[test]
    fn status_only_degrades() {
        let mut result = RebaseResult::new("base");
        assert_eq!(result.status, RebaseStatus::UpToDate);

        let sequence = [
            (op(RebaseStatus::Success, None), RebaseStatus::Success),
            (op(RebaseStatus::Conflicts, Some("c")), RebaseStatus::Conflicts),
            (op(RebaseStatus::Success, None), RebaseStatus::Conflicts),
            (op(RebaseStatus::Success, Some("boom")), RebaseStatus::Failure),
            (op(RebaseStatus::Success, None), RebaseStatus::Failure),
        ];
        for (index, (operation, expected)) in sequence.into_iter().enumerate() {
            result.add_operation(operation);
            assert_eq!(result.status, expected, "after op {index}");
            assert_eq!(result.operations.len(), index + 1);
        }
    }

    #[test]
    fn conflicts_are_append_only_and_unique() {
        let mut result = RebaseResult::new("base");
        result.add_conflicts(["a.txt".to_string(), "b.txt".to_string()]);
        result.add_conflicts(["a.txt".to_string(), "c.txt".to_string()]);
        assert_eq!(result.conflicts, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn up_to_date_when_nothing_to_replay() {
        let git = GitTestRepo::new().unwrap();
        git.write_file("a.txt", "a\n").unwrap();
        git.commit("base").unwrap();
        git.branch("feature").unwrap();
        git.switch("main").unwrap();
        let mut repo = Repository::new(git.path(), "acme/widgets");

        let result = repo.rebase("main", "feature").unwrap();
        assert_eq!(result.status, RebaseStatus::UpToDate);
        assert!(result.operations.is_empty());
    }

    #[test]
    fn clean_replay_succeeds_in_order() {
        let git = GitTestRepo::new().unwrap();
        git.write_file("a.txt", "a\n").unwrap();
        git.commit("base").unwrap();
        git.branch("feature").unwrap();
        git.write_file("f1.txt", "1\n").unwrap();
        git.commit("feature one").unwrap();
        git.write_file("f2.txt", "2\n").unwrap();
        git.commit("feature two").unwrap();
        git.switch("main").unwrap();
        git.write_file("m.txt", "m\n").unwrap();
        git.commit("main moves").unwrap();
        let main_before = git.rev_parse("main").unwrap();
        let mut repo = Repository::new(git.path(), "acme/widgets");

        let result = repo.rebase("main", "feature").unwrap();
        assert_eq!(result.status, RebaseStatus::Success);
        let messages: Vec<_> = result.operations.iter().map(|o| o.message.as_str()).collect();
        assert_eq!(messages, vec!["feature one", "feature two"]);
        assert!(!result.has_conflicts());
        assert_ne!(result.head, main_before);

        // the caller's checkout and branches are untouched
        assert_eq!(git.rev_parse("HEAD").unwrap(), main_before);
        assert_eq!(git.rev_parse("main").unwrap(), main_before);
        assert_eq!(git.run(&["worktree", "list"]).unwrap().lines().count(), 1);
    }

    #[test]
    fn conflicting_replay_records_paths() {
        let git = GitTestRepo::new().unwrap();
        git.write_file("shared.txt", "base\n").unwrap();
        git.commit("base").unwrap();
        git.branch("feature").unwrap();
        git.write_file("shared.txt", "feature\n").unwrap();
        git.commit("feature edits shared").unwrap();
        git.write_file("other.txt", "ok\n").unwrap();
        git.commit("feature adds other").unwrap();
        git.switch("main").unwrap();
        git.write_file("shared.txt", "main\n").unwrap();
        git.commit("main edits shared").unwrap();
        let mut repo = Repository::new(git.path(), "acme/widgets");

        let result = repo.rebase("main", "feature").unwrap();
        assert_eq!(result.status, RebaseStatus::Conflicts);
        assert_eq!(result.conflicts, vec!["shared.txt"]);
        assert_eq!(result.operations.len(), 2);
        assert_eq!(result.operations[0].status, RebaseStatus::Conflicts);
        assert_eq!(result.operations[1].status, RebaseStatus::Success);
        assert_eq!(git.run(&["worktree", "list"]).unwrap().lines().count(), 1);
    }

    #[test]
    fn picks_after_a_conflict_start_from_a_clean_tree() {
        let git = GitTestRepo::new().unwrap();
        git.write_file("shared.txt", "base\n").unwrap();
        git.commit("base").unwrap();
        git.branch("feature").unwrap();
        git.write_file("shared.txt", "feature\n").unwrap();
        git.commit("feature edits shared").unwrap();
        git.write_file("shared.txt", "feature again\n").unwrap();
        git.commit("feature edits shared again").unwrap();
        git.write_file("other.txt", "ok\n").unwrap();
        git.commit("feature adds other").unwrap();
        git.switch("main").unwrap();
        git.write_file("shared.txt", "main\n").unwrap();
        git.commit("main edits shared").unwrap();
        let main_tip = git.rev_parse("main").unwrap();
        let mut repo = Repository::new(git.path(), "acme/widgets");

        let result = repo.rebase("main", "feature").unwrap();
        let statuses: Vec<_> = result.operations.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                RebaseStatus::Conflicts,
                RebaseStatus::Conflicts,
                RebaseStatus::Success
            ]
        );
        assert_eq!(result.conflicts, vec!["shared.txt"]);
        assert_eq!(git.rev_parse(&format!("{}~1", result.head)).unwrap(), main_tip);
        assert_eq!(
            git.run(&["show", &format!("{}:shared.txt", result.head)]).unwrap(),
            "main"
        );
        assert_eq!(
            git.run(&["show", &format!("{}:other.txt", result.head)]).unwrap(),
            "ok"
        );
    }

    #[test]
    fn simulation_leaves_no_files_in_the_checkout() {
        let git = GitTestRepo::new().unwrap();
        git.write_file("a.txt", "a\n").unwrap();
        git.commit("base").unwrap();
        git.branch("feature").unwrap();
        git.write_file("f.txt", "f\n").unwrap();
        git.commit("feature").unwrap();
        git.switch("main").unwrap();
        let mut repo = Repository::new(git.path(), "acme/widgets");

        repo.rebase("main", "feature").unwrap();
        assert_eq!(git.run(&["status", "--porcelain"]).unwrap(), "");
        assert!(!git.path().join(".git").join("bw-rebase").read_dir().unwrap().any(|_| true));
    }

    #[test]
    fn unknown_base_is_a_rebase_error() {
        let git = GitTestRepo::new().unwrap();
        git.commit("base").unwrap();
        let mut repo = Repository::new(git.path(), "acme/widgets");
        let err = repo.rebase("nope", "main").unwrap_err();
        assert_eq!(err.op, Op::Rebase);
    }
}
