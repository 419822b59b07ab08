use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// An ordered queue of items keyed by `K`. A key appears at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize, V: Serialize",
    deserialize = "K: Deserialize<'de>, V: Deserialize<'de>"
))]
pub struct Sequencer<K, V> {
    items: VecDeque<(K, V)>,
}

impl<K, V> Default for Sequencer<K, V> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<K: PartialEq, V> Sequencer<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value`, or updates it in place when `key` is already queued.
    pub fn push(&mut self, key: K, value: V) {
        match self.position(&key) {
            Some(index) => self.items[index].1 = value,
            None => self.items.push_back((key, value)),
        }
    }

    /// Moves `key` to the front, inserting it if absent.
    pub fn priority(&mut self, key: K, value: V) {
        if let Some(index) = self.position(&key) {
            self.items.remove(index);
        }
        self.items.push_front((key, value));
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let index = self.position(key)?;
        self.items.remove(index).map(|(_, value)| value)
    }

    pub fn pop(&mut self) -> Option<(K, V)> {
        self.items.pop_front()
    }

    /// Swaps `key` with the item ahead of it. False when absent or already first.
    pub fn promote(&mut self, key: &K) -> bool {
        match self.position(key) {
            Some(index) if index > 0 => {
                self.items.swap(index, index - 1);
                true
            }
            _ => false,
        }
    }

    /// Swaps `key` with the item behind it. False when absent or already last.
    pub fn demote(&mut self, key: &K) -> bool {
        match self.position(key) {
            Some(index) if index + 1 < self.items.len() => {
                self.items.swap(index, index + 1);
                true
            }
            _ => false,
        }
    }

    pub fn peek(&self) -> Option<&(K, V)> {
        self.items.front()
    }

    pub fn position(&self, key: &K) -> Option<usize> {
        self.items.iter().position(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(K, V)> {
        self.items.iter()
    }
}
