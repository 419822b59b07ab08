use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Git(#[from] bw_git::GitError),
    #[error(transparent)]
    Config(#[from] bw_core::ConfigError),
    #[error(transparent)]
    EventStore(#[from] bw_events::EventStoreError),
    #[error(transparent)]
    Snapshot(#[from] bw_durable::SnapshotError),
    #[error("{path}:{line}: {source}")]
    Record {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
