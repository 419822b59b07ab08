use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use bw_events::EventId;

/// Branch name to the id of the event that most recently triggered work on
/// it. Owned by one Repo process and carried across continue-as-new.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchTriggers(BTreeMap<String, EventId>);

impl BranchTriggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id` for `branch`, replacing any earlier trigger.
    pub fn add(&mut self, branch: impl Into<String>, id: EventId) {
        self.0.insert(branch.into(), id);
    }

    pub fn get(&self, branch: &str) -> Option<&EventId> {
        self.0.get(branch)
    }

    pub fn branches(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_trigger_wins() {
        let mut triggers = BranchTriggers::new();
        let first = EventId::generate();
        let second = EventId::generate();
        triggers.add("feature", first);
        triggers.add("feature", second.clone());
        assert_eq!(triggers.get("feature"), Some(&second));
        assert_eq!(triggers.len(), 1);
    }

    #[test]
    fn unseen_branch_is_absent() {
        let mut triggers = BranchTriggers::new();
        triggers.add("feature", EventId::generate());
        assert!(triggers.get("main").is_none());
    }

    #[test]
    fn survives_serialization() {
        let mut triggers = BranchTriggers::new();
        triggers.add("a", EventId::generate());
        triggers.add("b", EventId::generate());
        let json = serde_json::to_value(&triggers).unwrap();
        assert!(json.is_object());
        let back: BranchTriggers = serde_json::from_value(json).unwrap();
        assert_eq!(back, triggers);
        assert_eq!(back.branches().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
