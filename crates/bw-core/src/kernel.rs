//! Narrow interfaces to everything outside the engine: the VCS provider, the
//! chat provider and the event sink.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use bw_events::{ChatHook, Event, EventBus, Flat, LinesExceed, MergeConflict, RepoHook};

use crate::error::KernelError;
use crate::types::FullRepo;

#[async_trait]
pub trait RepoHookClient: Send + Sync {
    /// A clone URL carrying whatever credentials the provider needs.
    async fn tokenized_clone_url(&self, repo: &FullRepo) -> Result<String, KernelError>;
}

#[async_trait]
pub trait ChatHookClient: Send + Sync {
    async fn notify_lines_exceed(
        &self,
        repo: &FullRepo,
        event: &Event<LinesExceed>,
    ) -> Result<(), KernelError>;

    async fn notify_merge_conflict(
        &self,
        repo: &FullRepo,
        event: &Event<MergeConflict>,
    ) -> Result<(), KernelError>;
}

/// Persist-event collaborator.
#[async_trait]
pub trait Pulse: Send + Sync {
    async fn persist(&self, event: Flat) -> Result<(), KernelError>;
}

/// Collaborators keyed by the hook they serve.
pub struct Kernel {
    repo_hooks: HashMap<RepoHook, Arc<dyn RepoHookClient>>,
    chat_hooks: HashMap<ChatHook, Arc<dyn ChatHookClient>>,
    pulse: Arc<dyn Pulse>,
}

impl Kernel {
    pub fn new(pulse: Arc<dyn Pulse>) -> Self {
        Self {
            repo_hooks: HashMap::new(),
            chat_hooks: HashMap::new(),
            pulse,
        }
    }

    #[must_use]
    pub fn with_repo_hook(mut self, hook: RepoHook, client: Arc<dyn RepoHookClient>) -> Self {
        self.repo_hooks.insert(hook, client);
        self
    }

    #[must_use]
    pub fn with_chat_hook(mut self, hook: ChatHook, client: Arc<dyn ChatHookClient>) -> Self {
        self.chat_hooks.insert(hook, client);
        self
    }

    pub fn repo_hook(&self, hook: RepoHook) -> Result<Arc<dyn RepoHookClient>, KernelError> {
        self.repo_hooks
            .get(&hook)
            .cloned()
            .ok_or_else(|| KernelError::NotConfigured {
                kind: "repo",
                hook: format!("{hook:?}").to_lowercase(),
            })
    }

    pub fn chat_hook(&self, hook: ChatHook) -> Result<Arc<dyn ChatHookClient>, KernelError> {
        self.chat_hooks
            .get(&hook)
            .cloned()
            .ok_or_else(|| KernelError::NotConfigured {
                kind: "chat",
                hook: format!("{hook:?}").to_lowercase(),
            })
    }

    pub fn pulse(&self) -> Arc<dyn Pulse> {
        self.pulse.clone()
    }
}

/// Publishes flat events onto an in-process bus.
pub struct BusPulse {
    bus: EventBus,
}

impl BusPulse {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Pulse for BusPulse {
    async fn persist(&self, event: Flat) -> Result<(), KernelError> {
        let id = event.id.clone();
        self.bus
            .publish(event)
            .map(|receivers| tracing::debug!(event_id = %id, receivers, "persisted"))
            .map_err(|_| KernelError::Failed(format!("no subscriber for event {id}")))
    }
}

/// Hands back the repository's own URL. For local or already-authenticated
/// remotes.
pub struct PassThroughRepoHook;

#[async_trait]
impl RepoHookClient for PassThroughRepoHook {
    async fn tokenized_clone_url(&self, repo: &FullRepo) -> Result<String, KernelError> {
        Ok(repo.url.clone())
    }
}

/// Writes notifications to the log instead of a chat provider.
pub struct LogChatHook;

#[async_trait]
impl ChatHookClient for LogChatHook {
    async fn notify_lines_exceed(
        &self,
        repo: &FullRepo,
        event: &Event<LinesExceed>,
    ) -> Result<(), KernelError> {
        tracing::info!(
            repo = %repo.name,
            branch = %event.payload.branch,
            lines = event.payload.lines.sum(),
            threshold = event.payload.threshold,
            event_id = %event.id,
            "lines exceeded"
        );
        Ok(())
    }

    async fn notify_merge_conflict(
        &self,
        repo: &FullRepo,
        event: &Event<MergeConflict>,
    ) -> Result<(), KernelError> {
        tracing::info!(
            repo = %repo.name,
            branch = %event.payload.head_branch,
            base = %event.payload.base_branch,
            conflicts = ?event.payload.conflicts,
            event_id = %event.id,
            "merge conflict"
        );
        Ok(())
    }
}
