/// Write path: `put()`, `delete()`, `force_flush()`.
///
/// All mutations flow through [`Engine::apply`]. Each record is first
/// appended to the WAL for durability, then applied to the memtable. When the
/// memtable reports itself full, the returned batch becomes a level-0 SSTable.
use anyhow::{ensure, Result};
use log::info;
use record::{Record, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Engine;

impl Engine {
    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Rejects empty or oversized keys and oversized values; otherwise fails
    /// only on I/O errors from the WAL or a triggered flush.
    pub fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );
        let ts = self.next_timestamp();
        self.apply(Record::put(key, value, ts))
    }

    /// Deletes `key`, returning `false` if it was not present.
    ///
    /// A present key gets a tombstone, which shadows every older value of
    /// the key until compaction can drop both.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        validate_key(key)?;
        if self.get(key)?.is_none() {
            return Ok(false);
        }
        let ts = self.next_timestamp();
        self.apply(Record::tombstone(key, ts))?;
        Ok(true)
    }

    /// Flushes a non-empty memtable to a new level-0 SSTable and truncates
    /// the WAL.
    pub fn force_flush(&mut self) -> Result<()> {
        if self.mem.is_empty() {
            return Ok(());
        }
        let batch = self.mem.drain_sorted();
        self.levels.flush(batch)?;
        self.wal.truncate_all()?;
        Ok(())
    }

    /// WAL append, cache eviction, memtable insert, then any flush the insert
    /// or the WAL size calls for.
    fn apply(&mut self, record: Record) -> Result<()> {
        self.wal.append(&record)?;
        self.cache()?.remove(record.key());

        let pending = record.clone();
        if let Some(batch) = self.mem.add_record(record) {
            self.levels.flush(batch)?;
            self.wal.truncate_all()?;
            // the triggering record now lives only in the fresh memtable
            self.wal.append(&pending)?;
        }

        let lwm = self.config.wal_low_water_mark as u64;
        if self.wal.segment_count() > lwm {
            info!(
                "wal: {} segments past low-water mark {}, forcing flush",
                self.wal.segment_count(),
                lwm
            );
            self.force_flush()?;
        }
        Ok(())
    }

    /// Nanoseconds since the epoch, forced strictly above the last timestamp.
    pub(crate) fn next_timestamp(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        self.last_ts = now.max(self.last_ts.saturating_add(1));
        self.last_ts
    }
}

fn validate_key(key: &str) -> Result<()> {
    ensure!(!key.is_empty(), "key must not be empty");
    ensure!(
        key.len() <= MAX_KEY_SIZE,
        "key too large: {} bytes (max {})",
        key.len(),
        MAX_KEY_SIZE
    );
    Ok(())
}
