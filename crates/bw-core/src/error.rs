use std::path::PathBuf;
use thiserror::Error;

use bw_durable::{DurableError, QueryError};
use bw_events::PayloadKind;
use bw_git::GitError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failures of the external collaborators reached through the kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("no {kind} hook registered for {hook}")]
    NotConfigured { kind: &'static str, hook: String },
    #[error("event hook {0} is not a chat hook")]
    NotChat(String),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Durable(#[from] DurableError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("unsupported event payload: {0}")]
    Unsupported(PayloadKind),
}
