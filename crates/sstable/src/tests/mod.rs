mod writer_tests;

use crate::*;
use anyhow::Result;
use std::path::Path;

pub(crate) fn put(key: &str, value: &str, ts: i64) -> Record {
    Record::put(key, value.as_bytes().to_vec(), ts)
}

pub(crate) fn del(key: &str, ts: i64) -> Record {
    Record::tombstone(key, ts)
}

/// Forms table `index` at level 0 from `records` under `root`.
pub(crate) fn form(root: &Path, index: u64, records: &[Record]) -> Result<SsTable> {
    SsTable::form(
        records,
        &SsTablePaths::new(root, 0, index),
        WriteOptions::default(),
    )
}

pub(crate) fn keys(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.key()).collect()
}
