use payroll_protocol::Event;
use std::collections::VecDeque;

/// Bounded, insertion-ordered record of the most recent published events.
///
/// Eviction is strict FIFO: once `capacity` is reached every push drops the
/// oldest entry.
#[derive(Debug)]
pub struct HistoryRing {
    entries: VecDeque<Event>,
    capacity: usize,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: Event) {
        self.entries.push_back(event);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
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

    /// Up to `limit` entries, newest first.
    pub fn newest(&self, limit: usize) -> Vec<Event> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// The last `n` entries in publish order (oldest first), for replay.
    pub fn tail(&self, n: usize) -> Vec<Event> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}
