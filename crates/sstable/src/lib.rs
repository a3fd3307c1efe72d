//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk sorted runs for the SlateKV storage engine.
//!
//! When the memtable fills up, the engine flushes its sorted records to disk
//! as an SSTable. SSTables are *write-once, read-many*: once formed they are
//! never modified, only deleted after compaction has merged them into a
//! table one level down.
//!
//! ## Files
//!
//! One table is six files, named after its level and index (see
//! [`SsTablePaths`]):
//!
//! | File | Content | Held in memory |
//! |---|---|---|
//! | data | records, concatenated | no |
//! | index | `key -> data offset`, one per record | no |
//! | summary | key range + every 10th index entry and the last | yes |
//! | filter | bloom filter over all keys | yes |
//! | merkle | SHA-256 tree over each record's encoding | no |
//! | toc | level, index and the five paths above | no |
//!
//! ## Point lookup
//!
//! ```text
//! key ──► bloom ──no──► miss
//!           │maybe
//!           ▼
//!        summary ──outside [min,max]──► miss
//!           │ bracket entry
//!           ▼
//!        index: scan ≤ interval entries from bracket offset
//!           │ data offset
//!           ▼
//!        data: seek + decode one record (CRC checked)
//! ```

mod format;
mod merge;
mod paths;
mod reader;
mod writer;

pub use format::{IndexEntry, Summary, DEFAULT_BLOOM_FPR, DEFAULT_SUMMARY_INTERVAL};
pub use merge::{merge, merge_all, TombstonePolicy};
pub use paths::{SsTablePaths, SUBDIRS};
pub use reader::SsTable;
pub use record::Record;
pub use writer::WriteOptions;

#[cfg(test)]
mod tests;
