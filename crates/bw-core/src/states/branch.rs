use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bw_durable::{ActivityError, Context, QueryError, Signal, Workflow};
use bw_events::{Action, DiffLines, Event, EventId, LinesExceed, MergeConflict, Push, Rebase, Scope};
use bw_git::RebaseStatus;

use crate::activities::{self, Workspace};
use crate::notify;
use crate::states::Services;
use crate::types::FullRepo;

#[derive(Debug)]
pub enum BranchSignal {
    Push(Event<Push>),
    Rebase(Event<Rebase>),
}

impl Signal for BranchSignal {
    fn name(&self) -> &'static str {
        match self {
            Self::Push(_) => "push",
            Self::Rebase(_) => "rebase",
        }
    }
}

#[derive(Debug)]
pub enum BranchQuery {
    State,
}

/// Fields a Branch carries across continue-as-new.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchState {
    pub repo: FullRepo,
    pub branch: String,
    /// Latest commit pushed to the branch.
    pub head: Option<String>,
    pub last_event: Option<EventId>,
    pub lines: Option<DiffLines>,
    pub rebase_status: Option<RebaseStatus>,
    #[serde(default)]
    pub conflicts: Vec<String>,
}

/// One process per (repository, branch). Sizes every push against the
/// default branch and checks the branch still rebases cleanly when the
/// default branch moves.
pub struct BranchWorkflow {
    services: Arc<Services>,
    state: BranchState,
}

impl BranchWorkflow {
    pub fn new(services: Arc<Services>, repo: FullRepo, branch: impl Into<String>) -> Self {
        Self {
            services,
            state: BranchState {
                repo,
                branch: branch.into(),
                head: None,
                last_event: None,
                lines: None,
                rebase_status: None,
                conflicts: Vec::new(),
            },
        }
    }

    async fn on_push(&mut self, ctx: &mut Context, event: Event<Push>) {
        self.state.head = Some(event.payload.after.clone());
        self.state.last_event = Some(event.id.clone());

        let session = match ctx.create_session().await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(workflow = %ctx.identity(), error = %err, "push: no session");
                return;
            }
        };
        let workspace = self.services.workspace(ctx, &self.state.repo);
        let outcome = session.run(self.size_push(ctx, &workspace, &event)).await;
        match outcome {
            Ok(Ok(lines)) => self.state.lines = Some(lines),
            Ok(Err(err)) => {
                tracing::warn!(workflow = %ctx.identity(), event_id = %event.id, error = %err, "push: failed");
            }
            Err(err) => {
                tracing::warn!(workflow = %ctx.identity(), event_id = %event.id, error = %err, "push: session expired");
            }
        }
        self.release(ctx, workspace).await;
        drop(session);
    }

    async fn size_push(
        &self,
        ctx: &mut Context,
        workspace: &Workspace,
        event: &Event<Push>,
    ) -> Result<DiffLines, ActivityError> {
        let repo = &self.state.repo;
        let kernel = &self.services.kernel;
        let sha = &event.payload.after;

        ctx.execute_activity("clone", || {
            activities::clone(
                kernel.clone(),
                repo.clone(),
                workspace.clone(),
                self.state.branch.clone(),
                sha.clone(),
            )
        })
        .await?;
        let diff = ctx
            .execute_activity("diff", || {
                activities::diff(workspace.clone(), repo.default_branch.clone(), sha.clone())
            })
            .await?;

        let lines = diff.lines;
        tracing::info!(
            workflow = %ctx.identity(),
            files = diff.files.count(),
            lines = lines.sum(),
            threshold = repo.threshold,
            "push: sized"
        );
        if lines.sum() > repo.threshold {
            let exceeded = event.next_on(
                repo.chat_hook(),
                Scope::LinesExceed,
                Action::Created,
                LinesExceed {
                    branch: self.state.branch.clone(),
                    lines,
                    threshold: repo.threshold,
                },
            );
            notify::lines_exceeded(ctx, kernel, repo, exceeded).await;
        }
        Ok(lines)
    }

    async fn on_rebase(&mut self, ctx: &mut Context, event: Event<Rebase>) {
        let Some(head) = self.state.head.clone() else {
            tracing::info!(workflow = %ctx.identity(), "rebase: no known head, skipping");
            return;
        };

        let session = match ctx.create_session().await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(workflow = %ctx.identity(), error = %err, "rebase: no session");
                return;
            }
        };
        let workspace = self.services.workspace(ctx, &self.state.repo);
        let outcome = session
            .run(self.simulate_rebase(ctx, &workspace, &event, &head))
            .await;
        match outcome {
            Ok(Ok((status, conflicts))) => {
                self.state.rebase_status = Some(status);
                self.state.conflicts = conflicts;
            }
            Ok(Err(err)) => {
                tracing::warn!(workflow = %ctx.identity(), event_id = %event.id, error = %err, "rebase: failed");
            }
            Err(err) => {
                tracing::warn!(workflow = %ctx.identity(), event_id = %event.id, error = %err, "rebase: session expired");
            }
        }
        self.release(ctx, workspace).await;
        drop(session);
    }

    async fn simulate_rebase(
        &self,
        ctx: &mut Context,
        workspace: &Workspace,
        event: &Event<Rebase>,
        head: &str,
    ) -> Result<(RebaseStatus, Vec<String>), ActivityError> {
        let repo = &self.state.repo;
        let kernel = &self.services.kernel;
        // The event names the new default-branch tip; fall back to the branch.
        let base = if event.payload.head.is_empty() {
            repo.default_branch.clone()
        } else {
            event.payload.head.clone()
        };

        ctx.execute_activity("clone", || {
            activities::clone(
                kernel.clone(),
                repo.clone(),
                workspace.clone(),
                self.state.branch.clone(),
                head.to_string(),
            )
        })
        .await?;
        let result = ctx
            .execute_activity("rebase", || {
                activities::rebase(
                    workspace.clone(),
                    repo.default_branch.clone(),
                    base.clone(),
                    head.to_string(),
                )
            })
            .await?;

        tracing::info!(
            workflow = %ctx.identity(),
            status = %result.status,
            operations = result.operations.len(),
            conflicts = result.conflicts.len(),
            "rebase: simulated"
        );
        if result.has_conflicts() {
            let conflict = event.next_on(
                repo.chat_hook(),
                Scope::MergeConflict,
                Action::Created,
                MergeConflict {
                    head_branch: self.state.branch.clone(),
                    base_branch: repo.default_branch.clone(),
                    head: head.to_string(),
                    conflicts: result.conflicts.clone(),
                },
            );
            notify::merge_conflict(ctx, kernel, repo, conflict).await;
        }
        Ok((result.status, result.conflicts))
    }

    /// Deletes the session's clone. Runs whether or not the work succeeded.
    async fn release(&self, ctx: &mut Context, workspace: Workspace) {
        let path = workspace.path.clone();
        if let Err(err) = ctx
            .execute_activity("remove", || activities::remove(workspace.clone()))
            .await
        {
            tracing::warn!(workflow = %ctx.identity(), path = %path.display(), error = %err, "clone: not removed");
        }
    }
}

#[async_trait]
impl Workflow for BranchWorkflow {
    const NAME: &'static str = "branch";
    type Signal = BranchSignal;
    type Query = BranchQuery;
    type Reply = BranchState;
    type Snapshot = BranchState;

    async fn on_signal(&mut self, ctx: &mut Context, signal: BranchSignal) {
        match signal {
            BranchSignal::Push(event) => self.on_push(ctx, event).await,
            BranchSignal::Rebase(event) => self.on_rebase(ctx, event).await,
        }
    }

    fn on_query(&self, query: BranchQuery) -> Result<BranchState, QueryError> {
        match query {
            BranchQuery::State => Ok(self.state.clone()),
        }
    }

    fn snapshot(&self) -> BranchState {
        self.state.clone()
    }

    fn restore(&mut self, snapshot: BranchState) {
        self.state = snapshot;
    }
}
