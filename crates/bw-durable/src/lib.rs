//! In-process durable execution: long-running single-threaded instances
//! addressed by identity, fed through signal channels, answering queries,
//! leasing worker sessions and externalizing state through snapshots.

pub mod activity;
pub mod config;
pub mod error;
pub mod history;
pub mod identity;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod workflow;

pub use crate::activity::{ActivityOptions, RetryPolicy};
pub use crate::config::RuntimeConfig;
pub use crate::error::{ActivityError, DurableError, QueryError, SessionError, SnapshotError};
pub use crate::identity::Identity;
pub use crate::registry::{Registry, Runtime};
pub use crate::session::{Session, SessionOptions, SessionPool};
pub use crate::snapshot::{MemorySnapshots, SnapshotRecord, SnapshotStore, SqliteSnapshots};
pub use crate::workflow::{Context, Signal, Workflow};
