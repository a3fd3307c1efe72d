//! # Memtable - SlateKV In-Memory Write Buffer
//!
//! Recent writes live in a [`SkipList`] until the memtable fills up. Fullness
//! is counted in entries, tombstones included:
//!
//! ```text
//! limit = max(1, floor(capacity * threshold))
//! ```
//!
//! When a record for a *new* key arrives while `len == limit`, the whole
//! sorted content is handed back to the caller as the flush batch and the
//! record lands in a fresh, empty list. Updates to keys already present never
//! trigger a flush.
//!
//! ## Lookup contract
//!
//! [`Memtable::get_record`] distinguishes three outcomes. A key deleted in the
//! memtable must stop the read path, so "deleted" is not the same as
//! "absent".
//!
//! | Result | Meaning | Caller |
//! |---|---|---|
//! | [`Lookup::Found`] | live record | return value |
//! | [`Lookup::Deleted`] | tombstone | return not-found, stop |
//! | [`Lookup::Absent`] | never seen | consult cache and SSTables |
mod skiplist;

pub use record::Record;
pub use skiplist::{Iter, SearchPath, SkipList};

/// Outcome of a memtable point lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Found(&'a Record),
    Deleted,
    Absent,
}

#[derive(Debug)]
pub struct Memtable {
    list: SkipList,
    capacity: usize,
    threshold: f64,
    limit: usize,
}

impl Memtable {
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or `threshold` is not in `(0, 1]`.
    pub fn new(capacity: usize, threshold: f64) -> Self {
        Self::with_list(SkipList::new(), capacity, threshold)
    }

    /// Memtable over a seeded skip list, for reproducible tests.
    pub fn with_seed(capacity: usize, threshold: f64, seed: u64) -> Self {
        Self::with_list(SkipList::with_seed(seed), capacity, threshold)
    }

    fn with_list(list: SkipList, capacity: usize, threshold: f64) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        assert!(
            threshold > 0.0 && threshold <= 1.0,
            "threshold must be in (0, 1]"
        );
        let limit = ((capacity as f64 * threshold).floor() as usize).max(1);
        Self {
            list,
            capacity,
            threshold,
            limit,
        }
    }

    /// Applies `record`, returning the flush batch if the memtable was full.
    ///
    /// A tombstone record marks its key deleted; any other record inserts or
    /// replaces the stored one.
    pub fn add_record(&mut self, record: Record) -> Option<Vec<Record>> {
        let flushed = if !self.list.contains(record.key()) && self.is_full() {
            Some(self.list.drain())
        } else {
            None
        };

        if record.is_tombstone() {
            self.list.delete(record);
        } else {
            self.list.insert(record, false);
        }
        flushed
    }

    pub fn get_record(&self, key: &str) -> Lookup<'_> {
        match self.list.get(key) {
            Some((_, true)) => Lookup::Deleted,
            Some((rec, false)) => Lookup::Found(rec),
            None => Lookup::Absent,
        }
    }

    /// Takes the sorted content, leaving the memtable empty.
    pub fn drain_sorted(&mut self) -> Vec<Record> {
        self.list.drain()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.list.len() >= self.limit
    }

    /// Records in key order, tombstones included.
    pub fn iter(&self) -> Iter<'_> {
        self.list.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
