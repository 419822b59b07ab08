use std::sync::Arc;

use bw_durable::{Identity, QueryError, Registry, Runtime, SessionPool, SnapshotStore};
use bw_events::{AnyPayload, Event, EventId, PayloadKind, PullRequestLabel, Push};

use crate::config::Config;
use crate::error::CoreError;
use crate::kernel::Kernel;
use crate::states::{
    BranchQuery, BranchState, BranchWorkflow, RepoQuery, RepoSignal, RepoWorkflow, Services,
    TrunkQuery, TrunkReply, TrunkWorkflow,
};
use crate::types::FullRepo;

/// Entry point of the engine: owns the runtime and the registries of the
/// three process kinds, and routes incoming events to Repo processes.
pub struct Core {
    prefix: String,
    runtime: Arc<Runtime>,
    services: Arc<Services>,
    repos: Registry<RepoWorkflow>,
    branches: Registry<BranchWorkflow>,
    trunks: Registry<TrunkWorkflow>,
}

impl Core {
    pub fn new(config: &Config, kernel: Kernel, snapshots: Arc<dyn SnapshotStore>) -> Self {
        let runtime = Runtime::new(config.runtime_config(), snapshots);
        let services = Arc::new(Services {
            kernel: Arc::new(kernel),
            clone_root: config.git.clone_root.clone(),
            committer: config.committer(),
        });
        Self {
            prefix: config.runtime.id_prefix.clone(),
            repos: Registry::new(runtime.clone()),
            branches: Registry::new(runtime.clone()),
            trunks: Registry::new(runtime.clone()),
            runtime,
            services,
        }
    }

    pub fn identity(&self, repo: &FullRepo) -> Identity {
        repo.identity(&self.prefix)
    }

    pub fn sessions(&self) -> &SessionPool {
        self.runtime.sessions()
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.services.kernel
    }

    pub async fn dispatch_push(&self, repo: &FullRepo, event: Event<Push>) -> Result<(), CoreError> {
        self.signal(repo, RepoSignal::Push(event)).await
    }

    pub async fn dispatch_label(
        &self,
        repo: &FullRepo,
        event: Event<PullRequestLabel>,
    ) -> Result<(), CoreError> {
        self.signal(repo, RepoSignal::Label(event)).await
    }

    /// Routes an event of any kind; only pushes and PR labels start work.
    pub async fn dispatch(&self, repo: &FullRepo, event: Event<AnyPayload>) -> Result<(), CoreError> {
        let kind = event.payload_kind();
        match kind {
            PayloadKind::Push => {
                let push = event.downcast::<Push>().ok_or(CoreError::Unsupported(kind))?;
                self.dispatch_push(repo, push).await
            }
            PayloadKind::PullRequestLabel => {
                let label = event
                    .downcast::<PullRequestLabel>()
                    .ok_or(CoreError::Unsupported(kind))?;
                self.dispatch_label(repo, label).await
            }
            _ => Err(CoreError::Unsupported(kind)),
        }
    }

    async fn signal(&self, repo: &FullRepo, signal: RepoSignal) -> Result<(), CoreError> {
        if !repo.is_active {
            tracing::debug!(repo = %repo.name, "inactive repository, dropping event");
            return Ok(());
        }
        let identity = self.identity(repo);
        let init = || {
            RepoWorkflow::new(
                self.services.clone(),
                self.branches.clone(),
                self.trunks.clone(),
                repo.clone(),
            )
        };
        self.repos.signal_with_start(&identity, signal, init).await?;
        Ok(())
    }

    pub async fn event_parent(&self, repo: &FullRepo, branch: &str) -> Result<EventId, QueryError> {
        self.repos
            .query(
                &self.identity(repo),
                RepoQuery::EventParent {
                    branch: branch.to_string(),
                },
            )
            .await
    }

    pub async fn branch_state(&self, repo: &FullRepo, branch: &str) -> Result<BranchState, QueryError> {
        self.branches
            .query(&self.identity(repo).branch(branch), BranchQuery::State)
            .await
    }

    pub async fn merge_queue(&self, repo: &FullRepo, query: TrunkQuery) -> Result<TrunkReply, QueryError> {
        self.trunks.query(&self.identity(repo).trunk(), query).await
    }

    pub async fn is_running(&self, identity: &Identity) -> bool {
        self.repos.contains(identity).await
            || self.branches.contains(identity).await
            || self.trunks.contains(identity).await
    }

    /// Stops every process, roots first so nothing is forwarded to a
    /// registry that is already draining.
    pub async fn shutdown(&self) {
        self.repos.shutdown().await;
        self.trunks.shutdown().await;
        self.branches.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingPulse, full_repo, push_event};
    use bw_durable::MemorySnapshots;
    use bw_events::{Action, Rebase, Scope};

    fn core() -> Core {
        let kernel = Kernel::new(Arc::new(RecordingPulse::default()));
        Core::new(&Config::default(), kernel, Arc::new(MemorySnapshots::new()))
    }

    #[tokio::test]
    async fn only_pushes_and_labels_are_dispatched() {
        let core = core();
        let repo = full_repo("widgets", "/nowhere", 10);
        let rebase = push_event(&repo, "main", "abc").next(
            Scope::Rebase,
            Action::Requested,
            Rebase {
                base: "main".to_string(),
                head: "abc".to_string(),
                repository: "widgets".to_string(),
            },
        );
        let err = core.dispatch(&repo, rebase.erase()).await.unwrap_err();
        assert!(matches!(err, CoreError::Unsupported(PayloadKind::Rebase)));
        assert!(!core.is_running(&core.identity(&repo)).await);
    }

    #[tokio::test]
    async fn identity_uses_configured_prefix() {
        let mut config = Config::default();
        config.runtime.id_prefix = "staging".to_string();
        let kernel = Kernel::new(Arc::new(RecordingPulse::default()));
        let core = Core::new(&config, kernel, Arc::new(MemorySnapshots::new()));
        let repo = full_repo("widgets", "/nowhere", 10);
        assert!(core.identity(&repo).as_str().starts_with("staging.core.org.acme.repo.widgets"));
    }
}
