use anyhow::{ensure, Context, Result};
use bloom::BloomFilter;
use log::debug;
use merkle::MerkleTree;
use record::Record;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::format::{IndexEntry, Summary, DEFAULT_BLOOM_FPR, DEFAULT_SUMMARY_INTERVAL};
use crate::{SsTable, SsTablePaths};

/// Tunables for forming a table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteOptions {
    /// Every `summary_interval`-th index entry is copied into the summary.
    pub summary_interval: usize,
    /// Target false positive rate of the bloom filter.
    pub bloom_fpr: f64,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            summary_interval: DEFAULT_SUMMARY_INTERVAL,
            bloom_fpr: DEFAULT_BLOOM_FPR,
        }
    }
}

impl SsTable {
    /// Writes `records` as a new table at `paths` and opens it.
    ///
    /// `records` must be non-empty and strictly ascending by key.
    ///
    /// # Crash Safety
    ///
    /// Each file is written to `<file>.tmp`, fsynced and renamed into place.
    /// The TOC goes last, so a TOC on disk means the other five files are
    /// complete. Leftover `.tmp` files are ignored on recovery.
    pub fn form(records: &[Record], paths: &SsTablePaths, opts: WriteOptions) -> Result<SsTable> {
        ensure!(!records.is_empty(), "refusing to write an empty SSTable");
        ensure!(
            records.windows(2).all(|w| w[0].key() < w[1].key()),
            "records must be strictly sorted by key"
        );
        SsTablePaths::create_dirs(paths.root())?;

        // DATA + in-memory index
        let mut index = Vec::with_capacity(records.len());
        let mut blocks = Vec::with_capacity(records.len());
        let mut offset = 0u64;
        write_atomic(paths.data(), |w| {
            for rec in records {
                let encoded = rec.encode();
                w.write_all(&encoded)?;
                index.push(IndexEntry::new(rec.key(), offset));
                offset += encoded.len() as u64;
                blocks.push(encoded);
            }
            Ok(())
        })?;

        // INDEX, remembering where each entry starts for the summary
        let mut index_positions = Vec::with_capacity(index.len());
        let mut pos = 0u64;
        write_atomic(paths.index_file(), |w| {
            for entry in &index {
                entry.write_to(w)?;
                index_positions.push(IndexEntry::new(entry.key.clone(), pos));
                pos += entry.encoded_len();
            }
            Ok(())
        })?;

        let mut summary = Summary::sample(&index_positions, opts.summary_interval);
        summary.max_timestamp = records.iter().map(Record::timestamp).max().unwrap_or(0);
        write_atomic(paths.summary(), |w| Ok(summary.write_to(w)?))?;

        let mut bloom = BloomFilter::new(records.len(), opts.bloom_fpr);
        for rec in records {
            bloom.insert(rec.key().as_bytes());
        }
        write_atomic(paths.filter(), |w| Ok(bloom.write_to(w)?))?;

        let tree = MerkleTree::build(&blocks);
        write_atomic(paths.merkle(), |w| Ok(w.write_all(tree.to_string().as_bytes())?))?;

        paths.write_toc()?;
        sync_parent_dirs(paths);

        debug!(
            "sstable: formed L{} #{} with {} records ({} bytes)",
            paths.level(),
            paths.index(),
            records.len(),
            offset
        );
        SsTable::open(paths.clone())
    }
}

/// Writes `path` through a temp file, fsync and rename.
fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<fs::File>) -> Result<()>,
{
    let tmp = path.with_extension("tmp");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .with_context(|| format!("creating {:?}", tmp))?;
    let mut w = BufWriter::new(file);
    fill(&mut w)?;
    w.flush()?;
    w.into_inner()?.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("renaming {:?} into place", tmp))?;
    Ok(())
}

/// Best-effort directory fsync so the renames survive a crash.
fn sync_parent_dirs(paths: &SsTablePaths) {
    for file in paths.all() {
        if let Some(dir) = file.parent() {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
    }
}
