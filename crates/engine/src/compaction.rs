/// Leveled compaction: the level manager that owns every open SSTable.
///
/// Flushes land in level 0. Whenever a level holds `max_tables_per_level`
/// tables and is not the last level, all of its tables are merged (oldest
/// first) into one table appended to the next level, and the merged tables
/// are deleted. The last level only accumulates.
///
/// ```text
///  L0  [t5][t6][t7][t8]   full ──merge──┐
///  L1  [t2][t4]                         ▼
///  L1  [t2][t4][t9]       t9 = merge(t5..t8)
/// ```
///
/// Tombstones are dropped by a merge only when every deeper level is empty;
/// otherwise an older copy of the key may still live below and the tombstone
/// must keep shadowing it.
use anyhow::{ensure, Context, Result};
use log::{debug, info, warn};
use sstable::{merge_all, Record, SsTable, SsTablePaths, TombstonePolicy, WriteOptions};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::manifest::Manifest;
use crate::recovery::sweep_unreferenced;

pub struct LevelManager {
    root: PathBuf,
    /// Open tables per level, oldest first.
    levels: Vec<Vec<SsTable>>,
    manifest: Manifest,
    max_tables_per_level: usize,
    opts: WriteOptions,
}

impl LevelManager {
    /// Opens every table the manifest lists under `root` and removes files
    /// the manifest does not reference.
    ///
    /// # Errors
    ///
    /// Fails if the manifest lists more than `level_count` levels, or if any
    /// listed table cannot be opened.
    pub fn open(
        root: &Path,
        mut manifest: Manifest,
        level_count: usize,
        max_tables_per_level: usize,
        opts: WriteOptions,
    ) -> Result<Self> {
        ensure!(level_count > 0, "at least one level is required");
        ensure!(
            manifest.levels.len() <= level_count,
            "manifest lists {} levels but only {} are configured",
            manifest.levels.len(),
            level_count
        );
        SsTablePaths::create_dirs(root)?;

        let mut levels: Vec<Vec<SsTable>> = (0..level_count).map(|_| Vec::new()).collect();
        let mut live = HashSet::new();
        for (level, tocs) in manifest.levels.iter().enumerate() {
            for toc in tocs {
                let paths = SsTablePaths::from_toc(root, toc)
                    .with_context(|| format!("manifest entry L{}:{}", level, toc.display()))?;
                ensure!(
                    paths.level() == level,
                    "{} says level {} but the manifest lists it at L{}",
                    toc.display(),
                    paths.level(),
                    level
                );
                manifest.next_index = manifest.next_index.max(paths.index() + 1);
                live.extend(paths.all().iter().map(|p| p.to_path_buf()));
                levels[level].push(SsTable::open(paths)?);
            }
        }

        let swept = sweep_unreferenced(root, &live)?;
        if swept > 0 {
            warn!("removed {} unreferenced SSTable file(s) under {:?}", swept, root);
        }

        Ok(Self {
            root: root.to_path_buf(),
            levels,
            manifest,
            max_tables_per_level,
            opts,
        })
    }

    /// Forms a level-0 table from sorted `records` and registers it.
    pub fn flush(&mut self, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let paths = SsTablePaths::new(&self.root, 0, self.manifest.allocate_index());
        let table = SsTable::form(&records, &paths, self.opts)?;
        info!(
            "flush: {} records -> {}",
            records.len(),
            paths.toc_relative().display()
        );
        self.add_sstable(table)
    }

    /// Appends a level-0 table, persists the manifest and compacts every level
    /// that reached its table limit.
    pub fn add_sstable(&mut self, table: SsTable) -> Result<()> {
        ensure!(table.level() == 0, "new tables enter at level 0, got L{}", table.level());
        self.levels[0].push(table);
        self.persist()?;

        let mut level = 0;
        while level + 1 < self.levels.len() && self.levels[level].len() >= self.max_tables_per_level
        {
            self.compact_level(level)?;
            level += 1;
        }
        Ok(())
    }

    /// Merges every table of `level` into one table at `level + 1`.
    fn compact_level(&mut self, level: usize) -> Result<()> {
        let target = level + 1;
        let runs = self.levels[level]
            .iter()
            .map(SsTable::read_records)
            .collect::<Result<Vec<_>>>()?;
        let input: usize = runs.iter().map(Vec::len).sum();

        let policy = if self.levels[target..].iter().all(Vec::is_empty) {
            TombstonePolicy::Drop
        } else {
            TombstonePolicy::Retain
        };
        let merged = merge_all(runs, policy);

        let formed = if merged.is_empty() {
            None
        } else {
            let paths = SsTablePaths::new(&self.root, target, self.manifest.allocate_index());
            Some(SsTable::form(&merged, &paths, self.opts)?)
        };

        let old = std::mem::take(&mut self.levels[level]);
        let old_count = old.len();
        if let Some(table) = formed {
            self.levels[target].push(table);
        }
        self.persist()?;

        for table in old {
            let toc = table.paths().toc().to_path_buf();
            if let Err(e) = table.delete_files() {
                warn!("compaction: failed to delete {:?}: {:#}", toc, e);
            }
        }

        info!(
            "compaction: L{} ({} tables, {} records) -> L{} ({} records, tombstones {:?})",
            level,
            old_count,
            input,
            target,
            merged.len(),
            policy
        );
        Ok(())
    }

    /// Finds the newest record for `key` across all levels.
    ///
    /// Tombstones are returned as-is; the caller decides what they mean.
    pub fn lookup(&self, key: &str) -> Result<Option<Record>> {
        let mut best: Option<Record> = None;
        // deepest (oldest) level first so later tables win timestamp ties
        for (level, tables) in self.levels.iter().enumerate().rev() {
            for table in tables {
                if let Some(rec) = table.lookup(key)? {
                    debug!("lookup {:?}: hit in L{} at ts {}", key, level, rec.timestamp());
                    if best.as_ref().map_or(true, |b| rec.timestamp() >= b.timestamp()) {
                        best = Some(rec);
                    }
                }
            }
        }
        Ok(best)
    }

    /// Runs the merkle integrity check on every table.
    pub fn verify_all(&self) -> Result<Vec<(PathBuf, bool)>> {
        self.tables()
            .map(|t| -> Result<(PathBuf, bool)> {
                Ok((t.paths().toc_relative(), t.verify_integrity()?))
            })
            .collect()
    }

    fn persist(&mut self) -> Result<()> {
        self.manifest.levels = self
            .levels
            .iter()
            .map(|tables| tables.iter().map(|t| t.paths().toc_relative()).collect())
            .collect();
        self.manifest.save()
    }

    /// All open tables, level by level, oldest first.
    pub fn tables(&self) -> impl Iterator<Item = &SsTable> + '_ {
        self.levels.iter().flatten()
    }

    #[must_use]
    pub fn table_counts(&self) -> Vec<usize> {
        self.levels.iter().map(Vec::len).collect()
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &[SsTable] {
        self.levels.get(level).map_or(&[][..], Vec::as_slice)
    }

    /// Greatest record timestamp held by any table, or 0 with none.
    pub fn max_timestamp(&self) -> i64 {
        self.tables().map(SsTable::max_timestamp).max().unwrap_or(0)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for LevelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelManager")
            .field("root", &self.root)
            .field("table_counts", &self.table_counts())
            .field("max_tables_per_level", &self.max_tables_per_level)
            .field("next_index", &self.manifest.next_index)
            .finish()
    }
}
