use std::hash::Hash;

use indexmap::IndexSet;
use parking_lot::RwLock;

use super::messages::Value;

/// Deduplicating, insertion-ordered record of every value this node has seen.
///
/// Values are only ever added. `add` performs check-and-insert under one
/// write lock so two concurrent receipts of the same value can never both
/// observe it as new.
#[derive(Debug, Default)]
pub struct ValueStore<V = Value> {
    seen: RwLock<IndexSet<V>>,
}

impl<V> ValueStore<V>
where
    V: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            seen: RwLock::new(IndexSet::new()),
        }
    }

    /// Insert `value`; returns true iff it was not present before.
    pub fn add(&self, value: V) -> bool {
        self.seen.write().insert(value)
    }

    /// Point-in-time copy in insertion order
    pub fn snapshot(&self) -> Vec<V> {
        self.seen.read().iter().cloned().collect()
    }

    pub fn contains(&self, value: &V) -> bool {
        self.seen.read().contains(value)
    }

    pub fn len(&self) -> usize {
        self.seen.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.read().is_empty()
    }
}
