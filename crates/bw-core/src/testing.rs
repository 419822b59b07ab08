//! Test doubles for the kernel collaborators and builders for common
//! fixtures.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use bw_events::{
    Action, ChatHook, Event, Flat, LinesExceed, MergeConflict, PullRequestLabel, Push, RepoHook,
    Scope,
};

use crate::error::KernelError;
use crate::kernel::{ChatHookClient, Pulse, RepoHookClient};
use crate::types::{FullRepo, Messaging, Org};

/// A github repository in org `acme` notifying on slack.
pub fn full_repo(name: &str, url: &str, threshold: i32) -> FullRepo {
    let org_id = Uuid::new_v4();
    FullRepo {
        id: Uuid::new_v4(),
        org_id,
        name: name.to_string(),
        hook: RepoHook::Github,
        hook_id: 1,
        default_branch: "main".to_string(),
        is_monorepo: false,
        threshold,
        stale_duration: Duration::from_secs(7 * 24 * 3600),
        url: url.to_string(),
        is_active: true,
        messaging: Some(Messaging {
            id: Uuid::new_v4(),
            hook: ChatHook::Slack,
            channel: "#eng".to_string(),
        }),
        org: Some(Org {
            id: org_id,
            name: "acme".to_string(),
        }),
    }
}

pub fn push_event(repo: &FullRepo, branch: &str, after: &str) -> Event<Push> {
    Event::new(
        repo.hook,
        repo.subject(),
        Scope::Push,
        Action::Created,
        Push {
            git_ref: format!("refs/heads/{branch}"),
            before: "0".repeat(40),
            after: after.to_string(),
            repository: repo.name.clone(),
            sender_id: None,
            commits: Vec::new(),
            timestamp: Utc::now(),
        },
    )
    .with_source("test")
}

pub fn label_event(
    repo: &FullRepo,
    action: Action,
    label: &str,
    number: i64,
    branch: &str,
) -> Event<PullRequestLabel> {
    Event::new(
        repo.hook,
        repo.subject(),
        Scope::PrLabel,
        action,
        PullRequestLabel {
            name: label.to_string(),
            number,
            branch: branch.to_string(),
        },
    )
    .with_source("test")
}

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingChat {
    lines: Mutex<Vec<Event<LinesExceed>>>,
    conflicts: Mutex<Vec<Event<MergeConflict>>>,
}

impl RecordingChat {
    pub fn lines_exceeded(&self) -> Vec<Event<LinesExceed>> {
        self.lines.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn merge_conflicts(&self) -> Vec<Event<MergeConflict>> {
        self.conflicts.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatHookClient for RecordingChat {
    async fn notify_lines_exceed(
        &self,
        _repo: &FullRepo,
        event: &Event<LinesExceed>,
    ) -> Result<(), KernelError> {
        self.lines
            .lock()
            .map_err(|_| KernelError::Failed("poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }

    async fn notify_merge_conflict(
        &self,
        _repo: &FullRepo,
        event: &Event<MergeConflict>,
    ) -> Result<(), KernelError> {
        self.conflicts
            .lock()
            .map_err(|_| KernelError::Failed("poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// Rejects every notification.
pub struct FailingChat;

#[async_trait]
impl ChatHookClient for FailingChat {
    async fn notify_lines_exceed(
        &self,
        _repo: &FullRepo,
        _event: &Event<LinesExceed>,
    ) -> Result<(), KernelError> {
        Err(KernelError::Failed("chat unavailable".to_string()))
    }

    async fn notify_merge_conflict(
        &self,
        _repo: &FullRepo,
        _event: &Event<MergeConflict>,
    ) -> Result<(), KernelError> {
        Err(KernelError::Failed("chat unavailable".to_string()))
    }
}

/// Cannot produce a clone URL.
pub struct FailingRepoHook;

#[async_trait]
impl RepoHookClient for FailingRepoHook {
    async fn tokenized_clone_url(&self, repo: &FullRepo) -> Result<String, KernelError> {
        Err(KernelError::Failed(format!("no token for {}", repo.name)))
    }
}

#[derive(Default)]
pub struct RecordingPulse {
    events: Mutex<Vec<Flat>>,
}

impl RecordingPulse {
    pub fn events(&self) -> Vec<Flat> {
        self.events.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Pulse for RecordingPulse {
    async fn persist(&self, event: Flat) -> Result<(), KernelError> {
        self.events
            .lock()
            .map_err(|_| KernelError::Failed("poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
