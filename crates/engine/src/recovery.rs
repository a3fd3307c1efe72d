/// Cold-start helpers: WAL replay and SSTable directory cleanup.
///
/// The manifest decides which tables exist. Anything else under the SSTable
/// root (temp files from an interrupted write, tables formed by a flush or
/// compaction that crashed before the manifest was saved) is garbage and is
/// removed before the engine starts serving.
///
/// A store with tables on disk but no `MANIFEST` gets one rebuilt from the
/// TOC files first, so the sweep never runs against an empty manifest.
use anyhow::{Context, Result};
use log::{debug, info, warn};
use memtable::Memtable;
use sstable::{SsTablePaths, SUBDIRS};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use wal::Wal;

use crate::compaction::LevelManager;
use crate::manifest::Manifest;

const TOC_DIR: &str = "toc";

/// Deletes every file under the SSTable sub-directories of `root` that is not
/// in `live`. Returns how many files were removed.
pub(crate) fn sweep_unreferenced(root: &Path, live: &HashSet<PathBuf>) -> Result<usize> {
    let mut removed = 0;
    for sub in SUBDIRS {
        let dir = root.join(sub);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e).with_context(|| format!("listing {:?}", dir)),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && !live.contains(&path) {
                debug!("removing unreferenced {:?}", path);
                fs::remove_file(&path).with_context(|| format!("removing {:?}", path))?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Registers every complete table found under `root/toc` in `manifest`,
/// oldest first within each level. Returns how many tables were added.
///
/// A TOC is written last, so its presence marks a finished table. TOCs that
/// cannot be parsed or whose files are missing are skipped and left for the
/// sweep.
pub(crate) fn bootstrap_manifest(root: &Path, manifest: &mut Manifest) -> Result<usize> {
    let toc_dir = root.join(TOC_DIR);
    let entries = match fs::read_dir(&toc_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("listing {:?}", toc_dir)),
    };

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "txt") {
            continue;
        }
        let Some(name) = path.file_name() else { continue };
        let rel = Path::new(TOC_DIR).join(name);
        match SsTablePaths::from_toc(root, &rel) {
            Ok(paths) if paths.all().iter().all(|p| p.is_file()) => found.push(paths),
            Ok(_) => warn!("skipping {:?}: table files are missing", rel),
            Err(e) => warn!("skipping {:?}: {:#}", rel, e),
        }
    }

    found.sort_by_key(|p| (p.level(), p.index()));
    for paths in &found {
        manifest.next_index = manifest.next_index.max(paths.index() + 1);
        manifest.add(paths.level(), paths.toc_relative());
    }
    Ok(found.len())
}

/// Replays the WAL into `mem`, returning the greatest timestamp seen.
///
/// Replay honours the memtable limit: when the log holds more records than
/// fit, each full batch is flushed through `levels` as it would have been at
/// write time. In that case the WAL is rewritten to hold only what is left in
/// the memtable.
pub(crate) fn replay_wal(wal: &mut Wal, mem: &mut Memtable, levels: &mut LevelManager) -> Result<i64> {
    let records = wal.replay().context("failed to replay WAL")?;
    let replayed = records.len();
    let mut last_ts = 0i64;
    let mut flushed = false;

    for rec in records {
        last_ts = last_ts.max(rec.timestamp());
        if let Some(batch) = mem.add_record(rec) {
            levels.flush(batch)?;
            flushed = true;
        }
    }

    if flushed {
        wal.truncate_all()?;
        for rec in mem.iter() {
            wal.append(rec)?;
        }
    }

    info!(
        "recovery: replayed {} WAL records ({} in memtable{})",
        replayed,
        mem.len(),
        if flushed { ", overflow flushed" } else { "" }
    );
    Ok(last_ts)
}
