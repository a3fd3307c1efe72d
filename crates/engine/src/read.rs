/// Read path: `get()` and `verify_sstables()`.
///
/// The memtable is authoritative for every key it holds, tombstones
/// included. Past it, the cache answers hot keys; a cache miss consults every
/// SSTable and keeps the record with the greatest timestamp.
use anyhow::{Context, Result};
use memtable::Lookup;
use std::path::PathBuf;

use crate::Engine;

impl Engine {
    /// Returns the live value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// A checksum mismatch in the winning record, or any SSTable I/O or
    /// decode failure, is returned as an error.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // 1. Memtable (respect tombstones)
        match self.mem.get_record(key) {
            Lookup::Found(rec) => return Ok(Some(rec.value().to_vec())),
            Lookup::Deleted => return Ok(None),
            Lookup::Absent => {}
        }

        // 2. Cache
        if let Some(value) = self.cache()?.get(key) {
            return Ok(Some(value.to_vec()));
        }

        // 3. SSTables, newest timestamp wins
        let Some(rec) = self.levels.lookup(key)? else {
            return Ok(None);
        };
        if rec.is_tombstone() {
            return Ok(None);
        }
        rec.verify()
            .with_context(|| format!("integrity fault reading {:?}", key))?;

        let value = rec.into_value();
        self.cache()?.add(key, value.clone());
        Ok(Some(value))
    }

    /// Checks every SSTable's data file against its merkle tree.
    ///
    /// Returns each table's TOC path (relative to the SSTable root) and
    /// whether it verified.
    pub fn verify_sstables(&self) -> Result<Vec<(PathBuf, bool)>> {
        self.levels.verify_all()
    }
}
