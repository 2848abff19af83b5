//! Bounded, newest-first cache of completed colorizations.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use shared::domain::RequestId;

use crate::image_store::DisplayRef;

pub const HISTORY_CAPACITY: usize = 5;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub request_id: RequestId,
    pub original: DisplayRef,
    pub colorized: DisplayRef,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct HistoryCache {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl HistoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero capacity is bumped to one so a push is never silently lost.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Prepends `entry` and returns whatever fell off the back. Dropping the
    /// returned entries releases their image references.
    pub fn push(&mut self, entry: HistoryEntry) -> Vec<HistoryEntry> {
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.split_off(self.capacity).into()
        } else {
            Vec::new()
        }
    }

    pub fn list(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn clear(&mut self) -> Vec<HistoryEntry> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
