use crate::error::{Cause, CherryPickError, Stage};
use crate::refs;
use crate::repository::Repository;

impl Repository {
    fn pick_error(&self, stage: Stage, commit: &str, cause: impl Into<Cause>) -> CherryPickError {
        CherryPickError {
            stage,
            repo_id: self.repo_id().to_string(),
            commit: commit.to_string(),
            cause: cause.into(),
        }
    }

    /// Re-creates `commit` on top of `branch`: same tree, author and message,
    /// with the branch tip as its only parent. Leaves `branch` checked out at
    /// the new commit and returns its id.
    pub fn cherry_pick(&mut self, branch: &str, commit: &str) -> Result<String, CherryPickError> {
        self.workdir()
            .map_err(|err| self.pick_error(Stage::Worktree, commit, err))?;

        self.ensure_local_branch(branch)
            .and_then(|()| self.checkout(branch))
            .map_err(|err| self.pick_error(Stage::Checkout, commit, err))?;

        let picked = self
            .resolve_commit(commit)
            .map_err(|err| self.pick_error(Stage::Commit, commit, err))?;
        let tip = self
            .resolve_commit(branch)
            .map_err(|err| self.pick_error(Stage::Commit, commit, err))?;

        let created = self
            .git()
            .as_committer(self.committer())
            .env("GIT_AUTHOR_NAME", picked.author_name.as_str())
            .env("GIT_AUTHOR_EMAIL", picked.author_email.as_str())
            .env("GIT_AUTHOR_DATE", picked.author_time.as_str())
            .args(["commit-tree", picked.tree.as_str(), "-p", tip.id.as_str(), "-m"])
            .arg(picked.message.trim_end())
            .run()
            .map_err(|err| self.pick_error(Stage::CommitObject, commit, err))?;
        self.git()
            .args(["update-ref", "-m", "cherry-pick"])
            .arg(refs::branch_name_to_ref(branch))
            .args([created.as_str(), tip.id.as_str()])
            .run()
            .map_err(|err| self.pick_error(Stage::CommitObject, commit, err))?;

        self.checkout(branch)
            .map_err(|err| self.pick_error(Stage::CheckoutPostCherryPick, commit, err))?;

        tracing::debug!(repo = %self.repo_id(), branch, commit, created = %created, "cherry-picked");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::GitTestRepo;

    #[test]
    fn picks_commit_onto_branch_tip() {
        let git = GitTestRepo::new().unwrap();
        git.write_file("a.txt", "a\n").unwrap();
        git.commit("base").unwrap();
        git.branch("feature").unwrap();
        git.write_file("f.txt", "feature\n").unwrap();
        git.commit("add feature file").unwrap();
        let picked = git.rev_parse("HEAD").unwrap();
        git.switch("main").unwrap();
        let tip = git.rev_parse("main").unwrap();

        let mut repo = Repository::new(git.path(), "acme/widgets");
        let created = repo.cherry_pick("main", &picked).unwrap();

        assert_eq!(git.rev_parse("main").unwrap(), created);
        assert_eq!(git.rev_parse("main~1").unwrap(), tip);
        assert_eq!(
            git.run(&["log", "-1", "--format=%s|%an", "main"]).unwrap(),
            "add feature file|Test User"
        );
        assert!(git.path().join("f.txt").exists());
        assert_eq!(git.run(&["rev-parse", "--abbrev-ref", "HEAD"]).unwrap(), "main");
    }

    #[test]
    fn unknown_commit_fails_at_commit_stage() {
        let git = GitTestRepo::new().unwrap();
        git.commit("base").unwrap();
        let mut repo = Repository::new(git.path(), "acme/widgets");

        let err = repo.cherry_pick("main", "deadbeef").unwrap_err();
        assert_eq!(err.stage, Stage::Commit);
        assert_eq!(err.commit, "deadbeef");
    }

    #[test]
    fn unknown_branch_fails_at_checkout_stage() {
        let git = GitTestRepo::new().unwrap();
        git.commit("base").unwrap();
        let head = git.rev_parse("HEAD").unwrap();
        let mut repo = Repository::new(git.path(), "acme/widgets");

        let err = repo.cherry_pick("missing", &head).unwrap_err();
        assert_eq!(err.stage, Stage::Checkout);
    }

    #[test]
    fn not_a_repository_fails_at_worktree_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::new(dir.path(), "acme/widgets");
        let err = repo.cherry_pick("main", "HEAD").unwrap_err();
        assert_eq!(err.stage, Stage::Worktree);
    }
}
