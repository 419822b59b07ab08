use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use bw_core::{BusPulse, Config, Core, CoreError, FullRepo, Kernel, LogChatHook, PassThroughRepoHook};
use bw_durable::SqliteSnapshots;
use bw_events::{AnyPayload, ChatHook, Event, EventBus, EventStore, RepoHook};

use crate::error::{CliError, Result};

#[derive(Args)]
pub struct ReplayArgs {
    /// JSON-lines file, one `{"repo": .., "event": ..}` record per line
    pub file: PathBuf,
}

/// One line of a replay file.
#[derive(Debug, Deserialize)]
pub struct ReplayRecord {
    pub repo: FullRepo,
    pub event: Event<AnyPayload>,
}

#[derive(Debug, Default, Serialize)]
pub struct ReplayResult {
    pub records: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub stored: usize,
}

pub fn read_records(path: &Path) -> Result<Vec<ReplayRecord>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| CliError::Record {
                path: path.display().to_string(),
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Feeds every record through a full engine wired to local collaborators,
/// then waits for all processes to drain. Input and derived events end up in
/// the event store.
pub async fn handle(args: ReplayArgs, config: &Config) -> Result<ReplayResult> {
    let records = read_records(&args.file)?;
    let db_path = &config.store.db_path;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = EventStore::new(rusqlite::Connection::open(db_path)?)?;
    let snapshots = SqliteSnapshots::open(db_path)?;

    let bus = EventBus::new(1024);
    let mut rx = bus.subscribe();
    let drain = tokio::spawn(async move {
        let mut stored = 0;
        loop {
            match rx.recv().await {
                Ok(flat) => match store.append(&flat) {
                    Ok(_) => stored += 1,
                    Err(err) => tracing::warn!(event_id = %flat.id, error = %err, "store: append failed"),
                },
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "store: lagging behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        stored
    });

    let kernel = Kernel::new(Arc::new(BusPulse::new(bus.clone())))
        .with_repo_hook(RepoHook::Github, Arc::new(PassThroughRepoHook))
        .with_repo_hook(RepoHook::Unspecified, Arc::new(PassThroughRepoHook))
        .with_chat_hook(ChatHook::Slack, Arc::new(LogChatHook))
        .with_chat_hook(ChatHook::Unspecified, Arc::new(LogChatHook));
    let core = Core::new(config, kernel, Arc::new(snapshots));

    let mut result = ReplayResult {
        records: records.len(),
        ..ReplayResult::default()
    };
    for ReplayRecord { repo, event } in records {
        let _ = bus.publish(event.flatten());
        let event_id = event.id.clone();
        match core.dispatch(&repo, event).await {
            Ok(()) => result.dispatched += 1,
            Err(CoreError::Unsupported(kind)) => {
                tracing::info!(event_id = %event_id, %kind, "replay: skipped");
                result.skipped += 1;
            }
            Err(err) => {
                tracing::warn!(event_id = %event_id, error = %err, "replay: dispatch failed");
                result.skipped += 1;
            }
        }
    }

    core.shutdown().await;
    drop(core);
    drop(bus);
    result.stored = drain.await.unwrap_or_default();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_core::testing::{full_repo, label_event, push_event};
    use bw_events::Action;

    fn line(repo: &FullRepo, event: Event<AnyPayload>) -> String {
        serde_json::json!({ "repo": repo, "event": event }).to_string()
    }

    #[test]
    fn reads_json_lines_and_reports_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let repo = full_repo("widgets", "/nowhere", 10);
        let path = dir.path().join("events.jsonl");
        let content = format!(
            "{}\n\n{}\n",
            line(&repo, push_event(&repo, "feature", "abc").erase()),
            line(&repo, label_event(&repo, Action::Created, "quantm-merge", 1, "feature").erase()),
        );
        std::fs::write(&path, content).unwrap();
        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].repo, repo);

        std::fs::write(&path, "{not json}\n").unwrap();
        let err = read_records(&path).unwrap_err();
        assert!(matches!(err, CliError::Record { line: 1, .. }));
    }

    #[tokio::test]
    async fn replay_stores_inputs_and_skips_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let repo = full_repo("widgets", "/nowhere", 10);
        let label = label_event(&repo, Action::Created, "quantm-merge", 7, "feature");
        let rebase = push_event(&repo, "main", "abc").next(
            bw_events::Scope::Rebase,
            Action::Requested,
            bw_events::Rebase {
                base: "main".to_string(),
                head: "abc".to_string(),
                repository: "widgets".to_string(),
            },
        );
        let path = dir.path().join("events.jsonl");
        std::fs::write(
            &path,
            format!(
                "{}\n{}\n",
                line(&repo, label.clone().erase()),
                line(&repo, rebase.erase())
            ),
        )
        .unwrap();

        let mut config = Config::default();
        config.store.db_path = dir.path().join("bw.db");
        config.git.clone_root = dir.path().join("clones");
        let result = handle(ReplayArgs { file: path }, &config).await.unwrap();

        assert_eq!(result.records, 2);
        assert_eq!(result.dispatched, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.stored, 2);

        let store = EventStore::new(rusqlite::Connection::open(&config.store.db_path).unwrap()).unwrap();
        let stored = store.list(None, None).unwrap();
        assert_eq!(stored[0].id, label.id);
    }
}
