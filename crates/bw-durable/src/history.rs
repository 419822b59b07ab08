use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entry {
    Signal {
        name: String,
    },
    SideEffect {
        value: serde_json::Value,
    },
    Activity {
        name: String,
        attempts: u32,
        ok: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub entry: Entry,
}

/// Append-only log of what one incarnation applied. Cleared only by
/// continue-as-new.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
    next_seq: u64,
}

impl History {
    pub fn record(&mut self, entry: Entry) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(HistoryEntry {
            seq,
            at: Utc::now(),
            entry,
        });
        seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn signals(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match &entry.entry {
            Entry::Signal { name } => Some(name.as_str()),
            _ => None,
        })
    }

    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }
}
