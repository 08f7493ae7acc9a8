use std::collections::HashMap;
use std::sync::RwLock;

use log::debug;

use super::assignment::{Assignment, SolveStats};

/// Process-wide cache of successful solves, keyed by the deterministic
/// content hash of the compiled problem.
///
/// Because the key covers the whole encoding (all contributing package
/// facts, the reuse pool, and configuration), a stale entry can never be
/// served for a changed problem. Concurrent writers to the same key
/// coalesce: the second writer observes the existing entry and leaves it,
/// which is sound because solving is deterministic.
#[derive(Default)]
pub struct SolveCache {
    entries: RwLock<HashMap<String, (Assignment, SolveStats)>>,
}

impl SolveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(&self, key: &str) -> Option<(Assignment, SolveStats)> {
        let entries = self.entries.read().expect("solve cache poisoned");
        let hit = entries.get(key).cloned();
        if hit.is_some() {
            debug!("concretization cache hit for {key}");
        }
        hit
    }

    pub fn store(&self, key: &str, assignment: Assignment, stats: SolveStats) {
        let mut entries = self.entries.write().expect("solve cache poisoned");
        // First writer wins; a racing redundant solve produced an identical
        // result anyway.
        entries.entry(key.to_string()).or_insert((assignment, stats));
    }

    pub fn clear(&self) {
        self.entries.write().expect("solve cache poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("solve cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
