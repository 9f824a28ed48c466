//! Append-only memory ledger.
//!
//! Entries are kept in the order they were appended (that is what gets
//! persisted). A side index sorted by `(timestamp, append order)` serves
//! time-window queries; in-order appends just push onto both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::MemoryEntry;
use crate::error::Result;
use crate::types::TimeWindow;

/// Append-only, time-ordered memory history of one entity.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    entries: Vec<MemoryEntry>,
    /// Indices into `entries`, sorted by timestamp then append order.
    by_time: Vec<usize>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted entries (append order).
    #[must_use]
    pub fn from_entries(entries: Vec<MemoryEntry>) -> Self {
        let mut by_time: Vec<usize> = (0..entries.len()).collect();
        // Stable sort keeps append order among equal timestamps.
        by_time.sort_by_key(|&i| entries[i].timestamp);
        Self { entries, by_time }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in append order.
    #[must_use]
    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    /// Most recent entry by timestamp.
    #[must_use]
    pub fn latest(&self) -> Option<&MemoryEntry> {
        self.by_time.last().map(|&i| &self.entries[i])
    }

    /// Append one entry after checking it.
    ///
    /// Returns the entry's append position.
    ///
    /// # Errors
    /// [`crate::PsycheError::Rejected`] for an empty event or a timestamp
    /// after `latest_allowed`. The ledger is unchanged on error.
    pub fn append(&mut self, entry: MemoryEntry, latest_allowed: DateTime<Utc>) -> Result<usize> {
        entry.check_appendable("memory", latest_allowed)?;
        let idx = self.entries.len();
        let ts = entry.timestamp;
        self.entries.push(entry);

        let in_order = self
            .by_time
            .last()
            .is_none_or(|&last| self.entries[last].timestamp <= ts);
        if in_order {
            self.by_time.push(idx);
        } else {
            let entries = &self.entries;
            let pos = self.by_time.partition_point(|&i| entries[i].timestamp <= ts);
            self.by_time.insert(pos, idx);
        }
        Ok(idx)
    }

    /// Entries inside `window`, oldest first, at most `limit` of them.
    ///
    /// The returned query is lazy and can be cloned to iterate again from the
    /// start.
    #[must_use]
    pub fn query(&self, window: TimeWindow, limit: usize) -> MemoryQuery<'_> {
        let entries = &self.entries;
        let start = match window.from {
            Some(from) => self.by_time.partition_point(|&i| entries[i].timestamp < from),
            None => 0,
        };
        let end = match window.to {
            Some(to) => self.by_time.partition_point(|&i| entries[i].timestamp <= to),
            None => self.by_time.len(),
        };
        let end = end.max(start).min(start.saturating_add(limit));
        MemoryQuery {
            ledger: self,
            pos: start,
            end,
        }
    }
}

impl PartialEq for MemoryLedger {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl From<Vec<MemoryEntry>> for MemoryLedger {
    fn from(entries: Vec<MemoryEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl Serialize for MemoryLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MemoryLedger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Vec::<MemoryEntry>::deserialize(deserializer).map(Self::from_entries)
    }
}

/// Lazy, finite window over a ledger in timestamp order.
#[derive(Debug, Clone)]
pub struct MemoryQuery<'a> {
    ledger: &'a MemoryLedger,
    pos: usize,
    end: usize,
}

impl<'a> Iterator for MemoryQuery<'a> {
    type Item = &'a MemoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let idx = self.ledger.by_time[self.pos];
        self.pos += 1;
        Some(&self.ledger.entries[idx])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end - self.pos;
        (n, Some(n))
    }
}

impl ExactSizeIterator for MemoryQuery<'_> {}
