//! # Engine - SlateKV Storage Engine
//!
//! The central orchestrator that ties together the [`memtable`], [`wal`],
//! [`sstable`] and [`cache`] crates into a complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌─────────────────────────────────────────────────────┐
//! │                       ENGINE                        │
//! │                                                     │
//! │ write.rs → WAL append → cache evict → Memtable      │
//! │              |                                      │
//! │              |  (memtable full / WAL past lwm?)     │
//! │              |            yes                       │
//! │              v                                      │
//! │           flush → new L0 SSTable, WAL truncated     │
//! │              |                                      │
//! │              |  (level count >= lsm_level_max?)     │
//! │              v                                      │
//! │           compaction.rs → merged table one level ↓  │
//! │                                                     │
//! │ read.rs → Memtable → LRU cache → every SSTable      │
//! │            (greatest timestamp wins)                │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Purpose |
//! |---|---|
//! | `lib.rs` | `Engine` struct, `open`, accessors, `Debug`, `Drop` |
//! | [`recovery`] | WAL replay, unreferenced file cleanup |
//! | `write` | `put()`, `delete()`, `force_flush()` |
//! | `read` | `get()`, `verify_sstables()` |
//! | [`compaction`] | [`LevelManager`]: levels, flush target, leveled compaction |
//! | [`manifest`] | Persistent level manifest (atomic file ops) |
//!
//! ## On-disk layout
//!
//! ```text
//! <data_dir>/
//!   MANIFEST          level -> TOC list, the source of truth for tables
//!   wal/wal_<n>.log   WAL segments
//!   sstable/<kind>/usertable_<level>_<index>_<kind>.db
//! ```
//!
//! ## Crash Safety
//!
//! Every write is appended to the WAL **before** the memtable sees it. The WAL
//! is only truncated **after** the flushed table and the manifest naming it
//! are on disk. Table files and the manifest are written via temp file,
//! fsync and rename.
pub mod compaction;
pub mod manifest;
mod read;
pub mod recovery;
mod write;

use anyhow::{anyhow, Result};
use cache::LruCache;
use config::EngineConfig;
use log::{info, warn};
use memtable::Memtable;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use wal::Wal;

pub use compaction::LevelManager;
pub use config;
pub use manifest::Manifest;
pub use record::{MAX_KEY_SIZE, MAX_VALUE_SIZE};
use sstable::WriteOptions;

/// Directory of the WAL segments inside the data directory.
pub const WAL_DIR: &str = "wal";
/// Directory of the SSTable files inside the data directory.
pub const SSTABLE_DIR: &str = "sstable";

/// The central storage engine orchestrating memtable, WAL, cache and levels.
///
/// # Write Path
///
/// 1. Assign a strictly increasing timestamp.
/// 2. Append the record to the WAL.
/// 3. Evict the key from the cache.
/// 4. Apply it to the memtable. If the memtable was full, its contents become
///    a new level-0 SSTable, the WAL is truncated and the new record is
///    re-appended.
/// 5. If the WAL now has more than `lwm` segments, force a flush.
///
/// # Read Path
///
/// 1. Memtable: a live record answers, a tombstone means not found.
/// 2. LRU cache.
/// 3. Every SSTable of every level; the greatest timestamp wins.
///
/// # Recovery
///
/// [`Engine::open`] loads the manifest, opens the listed tables, sweeps files
/// the manifest does not reference and replays the WAL into the memtable.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) mem: Memtable,
    pub(crate) wal: Wal,
    pub(crate) levels: LevelManager,
    pub(crate) cache: Mutex<LruCache>,
    /// Timestamp of the last write, in nanoseconds since the epoch.
    pub(crate) last_ts: i64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("data_dir", &self.config.data_dir)
            .field("memtable_entries", &self.mem.len())
            .field("memtable_limit", &self.mem.limit())
            .field("wal_segments", &self.wal.segment_count())
            .field("level_table_counts", &self.levels.table_counts())
            .field("cache_entries", &self.cache_len())
            .field("last_ts", &self.last_ts)
            .finish()
    }
}

impl Engine {
    /// Opens (or creates) the store described by `config`, recovering any
    /// state already on disk.
    ///
    /// Out-of-range config fields are reset to their defaults first.
    ///
    /// # Recovery Steps
    ///
    /// 1. Create `<data_dir>`, `wal/` and the SSTable sub-directories.
    /// 2. Load `MANIFEST`, or rebuild it from the TOC files if it is gone,
    ///    and open every table it lists, level by level.
    /// 3. Delete temp files and tables the manifest does not reference.
    /// 4. Replay the WAL into a fresh memtable, flushing if it overflows.
    /// 5. Seed the clock past every timestamp found in the WAL and tables.
    pub fn open(mut config: EngineConfig) -> Result<Self> {
        config.validate();
        let data_dir = config.data_dir.clone();
        std::fs::create_dir_all(&data_dir)?;

        let sstable_root = data_dir.join(SSTABLE_DIR);
        let had_manifest = data_dir.join(manifest::MANIFEST_FILENAME).exists();
        let mut manifest = Manifest::load_or_create(&data_dir)?;
        if !had_manifest {
            let found = recovery::bootstrap_manifest(&sstable_root, &mut manifest)?;
            if found > 0 {
                warn!("MANIFEST missing, rebuilt from {} table(s) on disk", found);
                manifest.save()?;
            }
        }
        let mut levels = LevelManager::open(
            &sstable_root,
            manifest,
            config.lsm_levels,
            config.max_tables_per_level,
            WriteOptions {
                summary_interval: config.summary_interval,
                bloom_fpr: config.bloom_fpr,
            },
        )?;

        let mut wal = Wal::open(data_dir.join(WAL_DIR), config.segment_size, config.wal_sync)?;
        let mut mem = Memtable::new(config.memtable_capacity, config.memtable_threshold);
        let last_ts = recovery::replay_wal(&mut wal, &mut mem, &mut levels)?
            .max(levels.max_timestamp());

        info!(
            "opened {:?}: {} tables {:?}, {} memtable entries",
            data_dir,
            levels.table_count(),
            levels.table_counts(),
            mem.len()
        );

        Ok(Self {
            cache: Mutex::new(LruCache::new(config.cache_size)),
            config,
            mem,
            wal,
            levels,
            last_ts,
        })
    }

    /// Opens `dir` with every other setting at its default.
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open(EngineConfig::default().with_data_dir(dir.as_ref()))
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.levels.manifest().path().to_path_buf()
    }

    /// Table count of each level, level 0 first.
    #[must_use]
    pub fn level_table_counts(&self) -> Vec<usize> {
        self.levels.table_counts()
    }

    /// Total number of SSTables across all levels.
    #[must_use]
    pub fn sstable_count(&self) -> usize {
        self.levels.table_count()
    }

    /// The level manager, for inspecting individual tables.
    pub fn levels(&self) -> &LevelManager {
        &self.levels
    }

    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.mem.len()
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Number of the WAL segment currently appended to.
    #[must_use]
    pub fn wal_segment_count(&self) -> u64 {
        self.wal.segment_count()
    }

    #[must_use]
    pub fn last_timestamp(&self) -> i64 {
        self.last_ts
    }

    pub(crate) fn cache(&self) -> Result<MutexGuard<'_, LruCache>> {
        self.cache
            .lock()
            .map_err(|e| anyhow!("cache lock poisoned: {}", e))
    }
}

/// Best-effort flush on drop.
///
/// Whatever is left in the memtable is written to an SSTable. Errors are
/// logged, not propagated; the data is still in the WAL and will be replayed
/// on the next open.
impl Drop for Engine {
    fn drop(&mut self) {
        if !self.mem.is_empty() {
            if let Err(e) = self.force_flush() {
                warn!("flush on drop failed: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests;
