//! Notification dispatch. Failures are logged and never propagate into the
//! calling workflow.

use std::sync::Arc;

use bw_durable::{ActivityError, Context};
use bw_events::{Event, Hook, LinesExceed, MergeConflict, Payload};

use crate::activities;
use crate::error::KernelError;
use crate::kernel::{ChatHookClient, Kernel};
use crate::types::FullRepo;

pub async fn lines_exceeded(
    ctx: &mut Context,
    kernel: &Arc<Kernel>,
    repo: &FullRepo,
    event: Event<LinesExceed>,
) {
    persist(ctx, kernel, &event).await;
    let result = ctx
        .execute_activity("notify_lines_exceed", || {
            let kernel = kernel.clone();
            let repo = repo.clone();
            let event = event.clone();
            async move {
                chat_client(&kernel, &event)?
                    .notify_lines_exceed(&repo, &event)
                    .await
                    .map_err(ActivityError::retryable)
            }
        })
        .await;
    if let Err(err) = result {
        tracing::warn!(repo = %repo.name, event_id = %event.id, error = %err, "notify: lines exceeded");
    }
}

pub async fn merge_conflict(
    ctx: &mut Context,
    kernel: &Arc<Kernel>,
    repo: &FullRepo,
    event: Event<MergeConflict>,
) {
    persist(ctx, kernel, &event).await;
    let result = ctx
        .execute_activity("notify_merge_conflict", || {
            let kernel = kernel.clone();
            let repo = repo.clone();
            let event = event.clone();
            async move {
                chat_client(&kernel, &event)?
                    .notify_merge_conflict(&repo, &event)
                    .await
                    .map_err(ActivityError::retryable)
            }
        })
        .await;
    if let Err(err) = result {
        tracing::warn!(repo = %repo.name, event_id = %event.id, error = %err, "notify: merge conflict");
    }
}

/// Records `event` through the persist-event collaborator, warning on failure.
pub async fn persist<P: Payload>(ctx: &mut Context, kernel: &Arc<Kernel>, event: &Event<P>) {
    let flat = event.flatten();
    let result = ctx
        .execute_activity("persist", || activities::persist(kernel.clone(), flat.clone()))
        .await;
    if let Err(err) = result {
        tracing::warn!(event_id = %event.id, error = %err, "persist: failed");
    }
}

fn chat_client<P: Payload>(
    kernel: &Kernel,
    event: &Event<P>,
) -> Result<Arc<dyn ChatHookClient>, ActivityError> {
    match event.context.hook {
        Hook::Chat(hook) => kernel.chat_hook(hook).map_err(ActivityError::non_retryable),
        other => Err(ActivityError::non_retryable(KernelError::NotChat(other.to_string()))),
    }
}
