//! Two-way merge of sorted record runs.
//!
//! Both inputs must be strictly ascending by key. On a key collision the
//! record with the greater timestamp survives; an equal timestamp goes to
//! the `newer` run. This is the primitive compaction folds over the tables
//! of a level, oldest first.
//!
//! ```text
//! older:  a@1  c@2        f@3
//! newer:       c@5  d@4   f@3(del)
//!         ─────────────────────────
//! Retain: a@1  c@5  d@4   f@3(del)
//! Drop:   a@1  c@5  d@4
//! ```
use record::Record;
use std::cmp::Ordering;

/// What to do with tombstones that survive a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstonePolicy {
    /// Remove them. Only safe when no older copy of the key can exist below.
    Drop,
    /// Keep them so they keep shadowing older data.
    Retain,
}

impl TombstonePolicy {
    fn keeps(self, rec: &Record) -> bool {
        !(rec.is_tombstone() && self == TombstonePolicy::Drop)
    }
}

/// Merges two sorted runs into one sorted, key-unique run.
pub fn merge(older: Vec<Record>, newer: Vec<Record>, policy: TombstonePolicy) -> Vec<Record> {
    let mut out = Vec::with_capacity(older.len() + newer.len());
    let mut left = older.into_iter().peekable();
    let mut right = newer.into_iter().peekable();

    loop {
        let order = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.key().cmp(r.key()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };
        let winner = match order {
            Ordering::Less => left.next(),
            Ordering::Greater => right.next(),
            Ordering::Equal => match (left.next(), right.next()) {
                (Some(l), Some(r)) if l.timestamp() > r.timestamp() => Some(l),
                (_, r) => r,
            },
        };
        if let Some(rec) = winner.filter(|r| policy.keeps(r)) {
            out.push(rec);
        }
    }
    out
}

/// Folds [`merge`] over `runs`, which must be ordered oldest first.
pub fn merge_all<I>(runs: I, policy: TombstonePolicy) -> Vec<Record>
where
    I: IntoIterator<Item = Vec<Record>>,
{
    let mut runs = runs.into_iter();
    let Some(first) = runs.next() else {
        return Vec::new();
    };
    let first: Vec<Record> = first.into_iter().filter(|r| policy.keeps(r)).collect();
    runs.fold(first, |acc, run| merge(acc, run, policy))
}
