use clap::{Args, Subcommand};
use std::path::PathBuf;

use bw_events::Diff;
use bw_git::{CommitInfo, GitError, RebaseResult, Repository, Signature};

use crate::error::Result;

#[derive(Subcommand)]
pub enum GitCommand {
    /// Diff two revisions of a local clone
    Diff(DiffArgs),
    /// Print the merge-base of two revisions
    Ancestor(PairArgs),
    /// Simulate rebasing `head` onto `base` without touching the checkout
    Rebase(RebaseArgs),
    /// Re-create a commit on top of a branch
    CherryPick(CherryPickArgs),
    /// Resolve a revision expression to a commit
    Resolve(ResolveArgs),
}

#[derive(Args)]
pub struct RepoArgs {
    /// Path to the local clone
    #[arg(long, short = 'C', default_value = ".")]
    pub repo: PathBuf,
}

#[derive(Args)]
pub struct DiffArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    pub from: String,
    pub to: String,
    /// Include the unified patch
    #[arg(long)]
    pub patch: bool,
}

#[derive(Args)]
pub struct PairArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    pub a: String,
    pub b: String,
}

#[derive(Args)]
pub struct RebaseArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    pub base: String,
    pub head: String,
}

#[derive(Args)]
pub struct CherryPickArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    pub branch: String,
    pub commit: String,
}

#[derive(Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    pub rev: String,
}

pub enum GitResult {
    Diff { diff: Diff, patch: bool },
    Ancestor(String),
    Rebase(RebaseResult),
    CherryPick(String),
    Resolve(CommitInfo),
}

fn open(args: &RepoArgs, committer: &Signature) -> Repository {
    let repo_id = args
        .repo
        .canonicalize()
        .unwrap_or_else(|_| args.repo.clone())
        .display()
        .to_string();
    Repository::new(&args.repo, repo_id).with_committer(committer.clone())
}

pub fn handle(cmd: GitCommand, committer: &Signature) -> Result<GitResult> {
    match cmd {
        GitCommand::Diff(args) => {
            let diff = open(&args.repo, committer)
                .diff(&args.from, &args.to)
                .map_err(GitError::from)?;
            Ok(GitResult::Diff {
                diff,
                patch: args.patch,
            })
        }
        GitCommand::Ancestor(args) => {
            let base = open(&args.repo, committer)
                .ancestor(&args.a, &args.b)
                .map_err(GitError::from)?;
            Ok(GitResult::Ancestor(base))
        }
        GitCommand::Rebase(args) => {
            let result = open(&args.repo, committer)
                .rebase(&args.base, &args.head)
                .map_err(GitError::from)?;
            Ok(GitResult::Rebase(result))
        }
        GitCommand::CherryPick(args) => {
            let created = open(&args.repo, committer)
                .cherry_pick(&args.branch, &args.commit)
                .map_err(GitError::from)?;
            Ok(GitResult::CherryPick(created))
        }
        GitCommand::Resolve(args) => {
            let info = open(&args.repo, committer)
                .resolve_commit(&args.rev)
                .map_err(GitError::from)?;
            Ok(GitResult::Resolve(info))
        }
    }
}
