use crate::activity::ActivityOptions;
use crate::session::SessionOptions;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// History length at which an instance continues as new.
    pub max_history: usize,
    /// Bound of each instance's signal and query channels.
    pub mailbox_capacity: usize,
    /// Concurrent sessions across all instances.
    pub session_slots: usize,
    pub session: SessionOptions,
    pub activity: ActivityOptions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_history: 1024,
            mailbox_capacity: 64,
            session_slots: 4,
            session: SessionOptions::default(),
            activity: ActivityOptions::default(),
        }
    }
}
