//! Bounded, ordered log history.
//!
//! [`HistoryBuffer`] keeps the most recent `capacity` events in insertion
//! order. New viewers receive a copy of it once when they connect; after that
//! they only see live broadcasts.

use std::collections::VecDeque;

use chrono::Utc;

use crate::events::{LogEvent, LogKind};
use crate::time_utils::ClockFormatter;

/// Number of events retained when no explicit capacity is configured.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Fixed-capacity FIFO of [`LogEvent`]s.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<LogEvent>,
    capacity: usize,
    clock: ClockFormatter,
}

impl HistoryBuffer {
    /// Create an empty buffer. A `capacity` of zero is treated as one.
    pub fn new(capacity: usize, clock: ClockFormatter) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            clock,
        }
    }

    /// Stamp a new event with the current time and record it.
    ///
    /// When the buffer is full the oldest event is evicted first. Callers are
    /// expected to have dropped blank messages already.
    pub fn append(&mut self, kind: LogKind, message: impl Into<String>) -> LogEvent {
        let timestamp = Utc::now();
        let event = LogEvent {
            kind,
            message: message.into(),
            time: self.clock.format(&timestamp),
            timestamp,
        };

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event.clone());
        event
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.entries.iter().cloned().collect()
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

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, ClockFormatter::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
