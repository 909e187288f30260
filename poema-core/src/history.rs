//! # History - Bounded Logs
//!
//! Kernels narrate themselves into fixed-capacity logs ("output",
//! "evolution history", "dialogue history"). When full, the oldest entry
//! is dropped first. Nothing else is ever removed or reordered.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::metrics::AggregateMetrics;

/// What a history entry carries
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum HistoryEvent {
    /// Flavor text describing an event
    Text(String),
    /// Metrics snapshot at that moment
    Metrics(AggregateMetrics),
}

/// Immutable `(timestamp, event)` record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Milliseconds, from the owning engine's clock
    pub timestamp: u64,

    pub event: HistoryEvent,
}

impl HistoryEntry {
    pub fn text(timestamp: u64, text: impl Into<String>) -> Self {
        Self { timestamp, event: HistoryEvent::Text(text.into()) }
    }

    pub fn metrics(timestamp: u64, metrics: AggregateMetrics) -> Self {
        Self { timestamp, event: HistoryEvent::Metrics(metrics) }
    }

    /// Text payload, if any
    pub fn as_text(&self) -> Option<&str> {
        match &self.event {
            HistoryEvent::Text(t) => Some(t),
            HistoryEvent::Metrics(_) => None,
        }
    }
}

/// Append-only log with FIFO overflow
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoundedHistoryLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
    /// Entries ever appended (including dropped ones)
    pub total_appended: u64,
}

impl<T> BoundedHistoryLog<T> {
    /// Create a log holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total_appended: 0,
        }
    }

    /// Append, dropping the oldest entry when full
    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total_appended += 1;
    }

    /// Newest `n` entries, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    /// All entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
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

impl<T: Clone> BoundedHistoryLog<T> {
    /// Owned copy of the newest `n` entries, oldest first
    pub fn snapshot(&self, n: usize) -> Vec<T> {
        self.recent(n).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_exceeds_capacity() {
        let mut log = BoundedHistoryLog::new(3);
        for i in 0..10 {
            log.push(i);
            assert!(log.len() <= 3);
        }
        assert_eq!(log.total_appended, 10);
    }

    #[test]
    fn test_overflow_drops_oldest_first() {
        let mut log = BoundedHistoryLog::new(3);
        for i in 1..=4 {
            log.push(i);
        }
        assert_eq!(log.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(log.latest(), Some(&4));
    }

    #[test]
    fn test_recent_is_chronological() {
        let mut log = BoundedHistoryLog::new(10);
        for i in 0..6 {
            log.push(i);
        }
        assert_eq!(log.snapshot(2), vec![4, 5]);
        assert_eq!(log.snapshot(50).len(), 6);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut log = BoundedHistoryLog::new(0);
        log.push(HistoryEntry::text(1, "first"));
        log.push(HistoryEntry::text(2, "second"));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.latest().and_then(|e| e.as_text()), Some("second"));
    }
}
