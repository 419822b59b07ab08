use std::time::Duration;
use thiserror::Error;

use crate::identity::Identity;

#[derive(Debug, Error)]
pub enum DurableError {
    #[error("workflow not running: {0}")]
    NotRunning(Identity),
    #[error("mailbox closed: {0}")]
    MailboxClosed(Identity),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Returned synchronously to the caller; queries are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("workflow not running: {0}")]
    NotRunning(Identity),
    #[error("query dropped before a reply was sent")]
    Dropped,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("snapshot store lock poisoned")]
    Poisoned,
    #[error("snapshot task: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no worker slot within {0:?}")]
    CreationTimeout(Duration),
    #[error("session exceeded {0:?}")]
    ExecutionTimeout(Duration),
    #[error("session pool closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    #[error("{0}")]
    Retryable(String),
    #[error("{0}")]
    NonRetryable(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ActivityError {
    pub fn retryable(err: impl std::fmt::Display) -> Self {
        Self::Retryable(err.to_string())
    }

    pub fn non_retryable(err: impl std::fmt::Display) -> Self {
        Self::NonRetryable(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_) | Self::Timeout(_))
    }
}
