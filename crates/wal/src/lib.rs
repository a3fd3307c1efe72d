//! # WAL - Segmented Write-Ahead Log
//!
//! Provides crash-safe durability for the SlateKV storage engine.
//!
//! Every mutation is encoded as a [`Record`] and appended to the WAL **before**
//! the memtable sees it. On restart the WAL is replayed to rebuild the
//! memtable, so no acknowledged write is lost.
//!
//! ## Segments
//!
//! The log is a directory of numbered segment files, each holding at most
//! `segment_size` records. Numbering starts at 1 and never has gaps.
//!
//! ```text
//! wal/
//!   wal_1.log   [rec][rec][rec][rec][rec]   full
//!   wal_2.log   [rec][rec][rec][rec][rec]   full
//!   wal_3.log   [rec][rec]                  current (appends go here)
//! ```
//!
//! Records use the shared [`record`] encoding; each carries a CRC32 of its
//! value.
//!
//! ## Replay rules
//!
//! | Condition | Result |
//! |---|---|
//! | Clean end of every segment | all records returned |
//! | Partial record at the tail of the **last** segment | tolerated, logged, dropped |
//! | Partial record anywhere else | [`WalError::Corrupt`] |
//! | CRC mismatch anywhere | [`WalError::Corrupt`] |
//!
//! ## Example
//!
//! ```rust,no_run
//! use record::Record;
//! use wal::Wal;
//!
//! let mut wal = Wal::open("data/wal", 5, true).unwrap();
//! wal.append(&Record::put("hello", b"world".to_vec(), 1)).unwrap();
//! for rec in wal.replay().unwrap() {
//!     println!("{:?}", rec);
//! }
//! ```
use log::{debug, info, warn};
use record::{Record, RecordError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SEGMENT_PREFIX: &str = "wal_";
const SEGMENT_SUFFIX: &str = ".log";

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed to decode: bad CRC, or truncated before the log tail.
    #[error("corrupt record in {path:?} at offset {offset}: {source}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        #[source]
        source: RecordError,
    },
}

/// Path of segment `n` inside `dir`.
pub fn segment_path(dir: &Path, n: u64) -> PathBuf {
    dir.join(format!("{}{}{}", SEGMENT_PREFIX, n, SEGMENT_SUFFIX))
}

/// Segment numbers present in `dir`, ascending.
fn list_segments(dir: &Path) -> Result<Vec<u64>, WalError> {
    let mut numbers: Vec<u64> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            name.strip_prefix(SEGMENT_PREFIX)?
                .strip_suffix(SEGMENT_SUFFIX)?
                .parse()
                .ok()
        })
        .collect();
    numbers.sort_unstable();
    Ok(numbers)
}

/// Outcome of decoding one segment file.
struct SegmentScan {
    records: Vec<Record>,
    /// Byte length of the complete records.
    valid_len: u64,
    /// A partial record follows `valid_len`.
    torn_tail: bool,
}

fn scan_segment(path: &Path) -> Result<SegmentScan, WalError> {
    let data = fs::read(path)?;
    let mut rest: &[u8] = &data;
    let mut records = Vec::new();

    loop {
        let offset = (data.len() - rest.len()) as u64;
        match Record::decode(&mut rest) {
            Ok(Some(rec)) => records.push(rec),
            Ok(None) => {
                return Ok(SegmentScan {
                    records,
                    valid_len: offset,
                    torn_tail: false,
                })
            }
            Err(RecordError::Truncated) => {
                return Ok(SegmentScan {
                    records,
                    valid_len: offset,
                    torn_tail: true,
                })
            }
            Err(RecordError::Io(e)) => return Err(WalError::Io(e)),
            Err(source) => {
                return Err(WalError::Corrupt {
                    path: path.to_path_buf(),
                    offset,
                    source,
                })
            }
        }
    }
}

/// Segmented append-only log.
///
/// When `sync` is `true`, every append is followed by `sync_all()` so the
/// record is on disk before the call returns.
pub struct Wal {
    dir: PathBuf,
    segment_size: usize,
    sync: bool,
    current: u64,
    file: File,
    records_in_segment: usize,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl Wal {
    /// Opens the log in `dir`, creating `wal_1.log` if no segment exists.
    ///
    /// The last segment is scanned to continue filling it. A partial record
    /// at its tail is cut off so new appends start on a record boundary.
    ///
    /// # Panics
    ///
    /// Panics if `segment_size` is 0.
    pub fn open<P: AsRef<Path>>(dir: P, segment_size: usize, sync: bool) -> Result<Self, WalError> {
        assert!(segment_size > 0, "segment_size must be > 0");
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let current = list_segments(&dir)?.last().copied().unwrap_or(1);
        let path = segment_path(&dir, current);

        let mut records_in_segment = 0;
        if path.exists() {
            let scan = scan_segment(&path)?;
            if scan.torn_tail {
                warn!(
                    "wal: dropping partial record at {:?} offset {}",
                    path, scan.valid_len
                );
                OpenOptions::new()
                    .write(true)
                    .open(&path)?
                    .set_len(scan.valid_len)?;
            }
            records_in_segment = scan.records.len();
        }

        let file = open_append(&path)?;
        debug!(
            "wal: opened {:?} (segment {}, {} records)",
            dir, current, records_in_segment
        );
        Ok(Self {
            dir,
            segment_size,
            sync,
            current,
            file,
            records_in_segment,
            buf: Vec::with_capacity(256),
        })
    }

    /// Encodes `record` and appends it, rotating to a new segment first when
    /// the current one is full.
    pub fn append(&mut self, record: &Record) -> Result<(), WalError> {
        if self.records_in_segment >= self.segment_size {
            self.rotate()?;
        }

        self.buf.clear();
        record.encode_into(&mut self.buf);
        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        self.records_in_segment += 1;
        Ok(())
    }

    /// Reads every record of every segment, oldest first.
    pub fn replay(&self) -> Result<Vec<Record>, WalError> {
        let numbers = list_segments(&self.dir)?;
        let mut out = Vec::new();
        for (i, n) in numbers.iter().enumerate() {
            let path = segment_path(&self.dir, *n);
            let scan = scan_segment(&path)?;
            if scan.torn_tail {
                if i + 1 != numbers.len() {
                    return Err(WalError::Corrupt {
                        path,
                        offset: scan.valid_len,
                        source: RecordError::Truncated,
                    });
                }
                warn!(
                    "wal: ignoring partial record at tail of {:?} (offset {})",
                    path, scan.valid_len
                );
            }
            out.extend(scan.records);
        }
        info!(
            "wal: replayed {} records from {} segments",
            out.len(),
            numbers.len()
        );
        Ok(out)
    }

    /// Deletes every segment and starts over at `wal_1.log`.
    pub fn truncate_all(&mut self) -> Result<(), WalError> {
        for n in list_segments(&self.dir)? {
            fs::remove_file(segment_path(&self.dir, n))?;
        }
        self.current = 1;
        self.records_in_segment = 0;
        self.file = open_append(&segment_path(&self.dir, 1))?;
        debug!("wal: truncated {:?}", self.dir);
        Ok(())
    }

    /// Forces buffered data to disk regardless of the `sync` setting.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Paths of all segments, oldest first.
    pub fn segment_paths(&self) -> Result<Vec<PathBuf>, WalError> {
        Ok(list_segments(&self.dir)?
            .into_iter()
            .map(|n| segment_path(&self.dir, n))
            .collect())
    }

    /// Number of the segment receiving appends; equals the segment count.
    #[must_use]
    pub fn segment_count(&self) -> u64 {
        self.current
    }

    #[must_use]
    pub fn records_in_current_segment(&self) -> usize {
        self.records_in_segment
    }

    #[must_use]
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn rotate(&mut self) -> Result<(), WalError> {
        if self.sync {
            self.file.sync_all()?;
        }
        self.current += 1;
        self.file = open_append(&segment_path(&self.dir, self.current))?;
        self.records_in_segment = 0;
        debug!("wal: rotated to segment {}", self.current);
        Ok(())
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("dir", &self.dir)
            .field("segment_size", &self.segment_size)
            .field("sync", &self.sync)
            .field("current", &self.current)
            .field("records_in_segment", &self.records_in_segment)
            .finish()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests;
