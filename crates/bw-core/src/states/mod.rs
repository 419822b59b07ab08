//! The three long-running processes of a repository: the Repo root, one
//! Branch per pushed branch and the Trunk.

pub mod branch;
pub mod repo;
pub mod sequencer;
pub mod trunk;

use std::path::PathBuf;
use std::sync::Arc;

use bw_durable::Context;
use bw_git::Signature;
use uuid::Uuid;

use crate::activities::Workspace;
use crate::kernel::Kernel;
use crate::types::FullRepo;

pub use crate::states::branch::{BranchQuery, BranchSignal, BranchState, BranchWorkflow};
pub use crate::states::repo::{RepoQuery, RepoSignal, RepoState, RepoWorkflow};
pub use crate::states::sequencer::Sequencer;
pub use crate::states::trunk::{QueueItem, TrunkQuery, TrunkReply, TrunkSignal, TrunkWorkflow};

/// What every process needs from outside the runtime.
pub struct Services {
    pub kernel: Arc<Kernel>,
    pub clone_root: PathBuf,
    pub committer: Signature,
}

impl Services {
    /// A fresh clone location. The directory name is recorded as a side
    /// effect so a replayed history sees the same path.
    pub(crate) fn workspace(&self, ctx: &mut Context, repo: &FullRepo) -> Workspace {
        let name = ctx.side_effect(Uuid::new_v4);
        Workspace::new(
            self.clone_root.join(name.to_string()),
            repo,
            self.committer.clone(),
        )
    }
}
