use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bw_durable::{Context, QueryError, Registry, Signal, Workflow};
use bw_events::{Action, Event, EventId, PullRequestLabel, Push, Rebase, Scope};
use bw_git::refs;

use crate::notify;
use crate::states::Services;
use crate::states::branch::{BranchSignal, BranchWorkflow};
use crate::states::trunk::{TrunkSignal, TrunkWorkflow};
use crate::triggers::BranchTriggers;
use crate::types::FullRepo;

#[derive(Debug)]
pub enum RepoSignal {
    Push(Event<Push>),
    Label(Event<PullRequestLabel>),
}

impl Signal for RepoSignal {
    fn name(&self) -> &'static str {
        match self {
            Self::Push(_) => "push",
            Self::Label(_) => "label",
        }
    }
}

#[derive(Debug)]
pub enum RepoQuery {
    /// Id of the event that last triggered work on a branch.
    EventParent { branch: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    pub repo: FullRepo,
    pub triggers: BranchTriggers,
}

/// Root process of a repository. Routes pushes to Branch processes and
/// labels to the Trunk, and remembers which event last touched each branch.
pub struct RepoWorkflow {
    services: Arc<Services>,
    branches: Registry<BranchWorkflow>,
    trunks: Registry<TrunkWorkflow>,
    state: RepoState,
}

impl RepoWorkflow {
    pub fn new(
        services: Arc<Services>,
        branches: Registry<BranchWorkflow>,
        trunks: Registry<TrunkWorkflow>,
        repo: FullRepo,
    ) -> Self {
        Self {
            services,
            branches,
            trunks,
            state: RepoState {
                repo,
                triggers: BranchTriggers::new(),
            },
        }
    }

    async fn on_push(&mut self, ctx: &mut Context, event: Event<Push>) {
        let git_ref = &event.payload.git_ref;
        if !refs::is_branch_ref(git_ref) {
            tracing::debug!(workflow = %ctx.identity(), git_ref = %git_ref, "push: not a branch");
            return;
        }
        let branch = refs::branch_name_from_ref(git_ref).to_string();
        self.state.triggers.add(branch.clone(), event.id.clone());

        if branch == self.state.repo.default_branch {
            self.request_rebases(ctx, &event).await;
            return;
        }

        let identity = ctx.identity().branch(&branch);
        let event_id = event.id.clone();
        let init = || BranchWorkflow::new(self.services.clone(), self.state.repo.clone(), branch.clone());
        if let Err(err) = self
            .branches
            .signal_with_start(&identity, BranchSignal::Push(event), init)
            .await
        {
            tracing::warn!(workflow = %ctx.identity(), branch = %branch, event_id = %event_id, error = %err, "push: not forwarded");
        }
    }

    /// The default branch moved: every other known branch has to be checked
    /// against its new tip.
    async fn request_rebases(&self, ctx: &mut Context, push: &Event<Push>) {
        let repo = self.state.repo.clone();
        let targets: Vec<String> = self
            .state
            .triggers
            .branches()
            .filter(|branch| *branch != repo.default_branch && !refs::is_managed_branch(branch))
            .map(str::to_string)
            .collect();

        for branch in targets {
            let event = push.next(
                Scope::Rebase,
                Action::Requested,
                Rebase {
                    base: repo.default_branch.clone(),
                    head: push.payload.after.clone(),
                    repository: push.payload.repository.clone(),
                },
            );
            notify::persist(ctx, &self.services.kernel, &event).await;

            let identity = ctx.identity().branch(&branch);
            let init = || BranchWorkflow::new(self.services.clone(), repo.clone(), branch.clone());
            if let Err(err) = self
                .branches
                .signal_with_start(&identity, BranchSignal::Rebase(event), init)
                .await
            {
                tracing::warn!(workflow = %ctx.identity(), branch = %branch, error = %err, "rebase: not forwarded");
            }
        }
    }

    async fn on_label(&self, ctx: &mut Context, event: Event<PullRequestLabel>) {
        let identity = ctx.identity().trunk();
        let init = || TrunkWorkflow::new(self.state.repo.clone());
        if let Err(err) = self
            .trunks
            .signal_with_start(&identity, TrunkSignal::Label(event), init)
            .await
        {
            tracing::warn!(workflow = %ctx.identity(), error = %err, "label: not forwarded");
        }
    }
}

#[async_trait]
impl Workflow for RepoWorkflow {
    const NAME: &'static str = "repo";
    type Signal = RepoSignal;
    type Query = RepoQuery;
    type Reply = EventId;
    type Snapshot = RepoState;

    async fn on_signal(&mut self, ctx: &mut Context, signal: RepoSignal) {
        match signal {
            RepoSignal::Push(event) => self.on_push(ctx, event).await,
            RepoSignal::Label(event) => self.on_label(ctx, event).await,
        }
    }

    fn on_query(&self, query: RepoQuery) -> Result<EventId, QueryError> {
        match query {
            RepoQuery::EventParent { branch } => self
                .state
                .triggers
                .get(&branch)
                .cloned()
                .ok_or_else(|| QueryError::NotFound(branch)),
        }
    }

    fn snapshot(&self) -> RepoState {
        self.state.clone()
    }

    fn restore(&mut self, snapshot: RepoState) {
        self.state = snapshot;
    }
}
