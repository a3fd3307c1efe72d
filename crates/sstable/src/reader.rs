use anyhow::{anyhow, bail, Context, Result};
use bloom::BloomFilter;
use log::debug;
use merkle::MerkleTree;
use record::Record;
use std::fs::{self, File};
use std::io::{self, BufReader, Seek, SeekFrom};
use std::sync::Mutex;

use crate::format::{IndexEntry, Summary};
use crate::SsTablePaths;

/// An open, immutable SSTable.
///
/// On [`open`](SsTable::open) the bloom filter and the summary are loaded into
/// memory. The index and data files stay on disk behind persistent handles,
/// each wrapped in a `Mutex` so lookups work through `&self`.
///
/// A point lookup costs at most one short sequential scan of the index file
/// plus one seek and read in the data file.
pub struct SsTable {
    paths: SsTablePaths,
    bloom: BloomFilter,
    summary: Summary,
    index_file: Mutex<BufReader<File>>,
    data_file: Mutex<BufReader<File>>,
}

impl SsTable {
    /// Opens the table listed at `paths`.
    pub fn open(paths: SsTablePaths) -> Result<Self> {
        let mut filter = BufReader::new(
            File::open(paths.filter()).with_context(|| format!("opening {:?}", paths.filter()))?,
        );
        let bloom = BloomFilter::read_from(&mut filter)
            .with_context(|| format!("reading bloom filter {:?}", paths.filter()))?;

        let mut summary_file = BufReader::new(
            File::open(paths.summary()).with_context(|| format!("opening {:?}", paths.summary()))?,
        );
        let summary = Summary::read_from(&mut summary_file)
            .with_context(|| format!("reading summary {:?}", paths.summary()))?;

        let index_file = File::open(paths.index_file())
            .with_context(|| format!("opening {:?}", paths.index_file()))?;
        let data_file =
            File::open(paths.data()).with_context(|| format!("opening {:?}", paths.data()))?;

        Ok(Self {
            paths,
            bloom,
            summary,
            index_file: Mutex::new(BufReader::new(index_file)),
            data_file: Mutex::new(BufReader::new(data_file)),
        })
    }

    /// Point lookup.
    ///
    /// Returns the stored record, tombstones included, or `Ok(None)` when the
    /// key is not in this table.
    ///
    /// # Steps
    ///
    /// 1. Bloom filter: a negative answer ends the lookup.
    /// 2. Summary: a key outside `[min_key, max_key]` ends the lookup; else
    ///    find the bracketing entry.
    /// 3. Index: scan from the bracket's offset up to the next summary entry.
    /// 4. Data: seek to the record and decode it.
    ///
    /// # Errors
    ///
    /// I/O failures, checksum mismatches and an index that points at a
    /// different key are all errors.
    pub fn lookup(&self, key: &str) -> Result<Option<Record>> {
        if !self.bloom.may_contain(key.as_bytes()) {
            return Ok(None);
        }
        let Some((start, end)) = self.summary.bracket(key) else {
            return Ok(None);
        };

        let Some(data_offset) = self.scan_index(key, start.offset, end)? else {
            debug!("sstable: bloom false positive for {:?} in {:?}", key, self.paths.toc());
            return Ok(None);
        };

        let mut f = self
            .data_file
            .lock()
            .map_err(|e| anyhow!("lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(data_offset))?;
        let rec = Record::decode(&mut *f)
            .with_context(|| format!("decoding record at {} in {:?}", data_offset, self.paths.data()))?
            .ok_or_else(|| anyhow!("index points past end of data file at {}", data_offset))?;
        if rec.key() != key {
            bail!(
                "index pointed to mismatching key {:?} (wanted {:?}) at offset {}",
                rec.key(),
                key,
                data_offset
            );
        }
        Ok(Some(rec))
    }

    /// Scans index entries in `[start, end)` for `key`.
    fn scan_index(&self, key: &str, start: u64, end: Option<u64>) -> Result<Option<u64>> {
        let mut f = self
            .index_file
            .lock()
            .map_err(|e| anyhow!("lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(start))?;
        let mut pos = start;

        while end.map_or(true, |e| pos < e) {
            let Some(entry) = IndexEntry::read_from(&mut *f)? else {
                break;
            };
            pos += entry.encoded_len();
            match entry.key.as_str().cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(entry.offset)),
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Less => {}
            }
        }
        Ok(None)
    }

    /// Streams the whole data file, in key order.
    pub fn read_records(&self) -> Result<Vec<Record>> {
        let mut r = BufReader::new(File::open(self.paths.data())?);
        let mut out = Vec::new();
        while let Some(rec) = Record::decode(&mut r)
            .with_context(|| format!("reading {:?}", self.paths.data()))?
        {
            out.push(rec);
        }
        Ok(out)
    }

    /// Recomputes the merkle root from the data file and compares it with
    /// the stored tree.
    pub fn verify_integrity(&self) -> Result<bool> {
        let stored = MerkleTree::read_from_file(self.paths.merkle())
            .with_context(|| format!("reading {:?}", self.paths.merkle()))?;
        let blocks: Vec<Vec<u8>> = self.read_records()?.iter().map(Record::encode).collect();
        let computed = MerkleTree::build(&blocks);
        Ok(stored.root() == computed.root())
    }

    /// Deletes all six files. The TOC goes first so a crash midway never
    /// leaves a TOC pointing at missing files.
    pub fn delete_files(self) -> Result<()> {
        let SsTable {
            paths,
            index_file,
            data_file,
            ..
        } = self;
        drop(index_file);
        drop(data_file);

        let mut files = paths.all();
        files.rotate_right(1);
        for file in files {
            match fs::remove_file(file) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("removing {:?}", file)),
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn paths(&self) -> &SsTablePaths {
        &self.paths
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.paths.level()
    }

    #[must_use]
    pub fn min_key(&self) -> &str {
        &self.summary.min_key
    }

    #[must_use]
    pub fn max_key(&self) -> &str {
        &self.summary.max_key
    }

    /// Greatest record timestamp stored in this table.
    #[must_use]
    pub fn max_timestamp(&self) -> i64 {
        self.summary.max_timestamp
    }

    /// Number of summary entries held in memory.
    #[must_use]
    pub fn summary_len(&self) -> usize {
        self.summary.entries.len()
    }

    #[must_use]
    pub fn may_contain(&self, key: &str) -> bool {
        self.bloom.may_contain(key.as_bytes())
    }
}

impl std::fmt::Debug for SsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsTable")
            .field("level", &self.paths.level())
            .field("index", &self.paths.index())
            .field("min_key", &self.summary.min_key)
            .field("max_key", &self.summary.max_key)
            .field("bloom", &self.bloom)
            .finish()
    }
}
