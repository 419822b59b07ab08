//! Change orchestration: one durable process per repository, per branch and
//! per trunk, driven by repository events and reaching the outside world
//! only through the [`kernel`] collaborators.

pub mod activities;
pub mod config;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod notify;
pub mod states;
pub mod testing;
pub mod triggers;
pub mod types;

pub use crate::config::Config;
pub use crate::engine::Core;
pub use crate::error::{ConfigError, CoreError, KernelError};
pub use crate::kernel::{
    BusPulse, ChatHookClient, Kernel, LogChatHook, PassThroughRepoHook, Pulse, RepoHookClient,
};
pub use crate::states::{
    BranchState, QueueItem, RepoState, Sequencer, TrunkQuery, TrunkReply,
};
pub use crate::triggers::BranchTriggers;
pub use crate::types::{FullRepo, Messaging, Org};
