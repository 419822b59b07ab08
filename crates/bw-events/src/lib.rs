pub mod bus;
pub mod ids;
pub mod payloads;
pub mod store;
pub mod types;

pub use crate::bus::EventBus;
pub use crate::ids::{EventId, IdError};
pub use crate::payloads::{
    AnyPayload, BranchOrTag, Commit, Diff, DiffCommits, DiffFiles, DiffLines, LinesExceed,
    MergeConflict, Payload, PayloadKind, PullRequest, PullRequestLabel, Push, Rebase, RefKind,
};
pub use crate::store::{EventStore, EventStoreError};
pub use crate::types::{
    Action, ChatHook, Event, EventContext, Flat, Hook, RepoHook, Scope, Subject, EVENT_VERSION,
};
