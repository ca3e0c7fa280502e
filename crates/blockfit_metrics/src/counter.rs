//! Named counters for tracking service events

use std::collections::BTreeMap;

/// Event counters keyed by name, iterated in name order.
pub struct Counter {
    counters: BTreeMap<String, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, name: &str, value: usize) {
        *self.counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> usize {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.counters.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &usize)> {
        self.counters.iter()
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}
