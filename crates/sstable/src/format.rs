//! Binary layout of the index and summary files.
//!
//! ## Index file
//!
//! One entry per record, in key order:
//!
//! ```text
//! [key_len: u64 LE][key][data_offset: u64 LE]
//! ```
//!
//! ## Summary file
//!
//! ```text
//! [min_key_len: u64][min_key][max_key_len: u64][max_key][max_ts: i64]
//! [entries_size: u64]
//! entries_size x [key_len: u64][key][index_offset: u64]
//! ```
//!
//! `max_ts` is the greatest record timestamp in the table, tombstones
//! included. Recovery seeds the engine clock from it.
//!
//! A summary entry is written for every `interval`-th record and always for
//! the last one, so the summary brackets every key of the table. Its offset
//! points into the index file.

use anyhow::{bail, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use record::MAX_KEY_SIZE;
use std::io::{self, Read, Write};

/// Default stride between summary entries.
pub const DEFAULT_SUMMARY_INTERVAL: usize = 10;

/// Default bloom filter false positive rate (1%).
pub const DEFAULT_BLOOM_FPR: f64 = 0.01;

/// A key and a byte offset into the next file down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: String,
    pub offset: u64,
}

impl IndexEntry {
    pub fn new(key: impl Into<String>, offset: u64) -> Self {
        Self {
            key: key.into(),
            offset,
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        8 + self.key.len() as u64 + 8
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_key(w, &self.key)?;
        w.write_u64::<LittleEndian>(self.offset)
    }

    /// Reads one entry; `Ok(None)` at a clean end of stream.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Self>> {
        let key_len = match r.read_u64::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let key = read_key_body(r, key_len)?;
        let offset = r.read_u64::<LittleEndian>()?;
        Ok(Some(Self { key, offset }))
    }
}

/// Sparse index over the index file, held in memory by an open table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub min_key: String,
    pub max_key: String,
    /// Greatest record timestamp in the table.
    pub max_timestamp: i64,
    pub entries: Vec<IndexEntry>,
}

impl Summary {
    /// Samples `index` every `interval` entries, plus the final entry.
    ///
    /// `max_timestamp` starts at 0; the writer fills it in.
    ///
    /// # Panics
    ///
    /// Panics if `index` is empty or `interval` is 0.
    pub fn sample(index: &[IndexEntry], interval: usize) -> Self {
        assert!(!index.is_empty(), "cannot summarize an empty index");
        assert!(interval > 0, "summary interval must be > 0");

        let mut entries: Vec<IndexEntry> = index.iter().step_by(interval).cloned().collect();
        let last = &index[index.len() - 1];
        if entries.last() != Some(last) {
            entries.push(last.clone());
        }
        Self {
            min_key: index[0].key.clone(),
            max_key: last.key.clone(),
            max_timestamp: 0,
            entries,
        }
    }

    /// Whether `key` falls inside `[min_key, max_key]`.
    #[must_use]
    pub fn covers(&self, key: &str) -> bool {
        self.min_key.as_str() <= key && key <= self.max_key.as_str()
    }

    /// Entry at or immediately before `key`, and the offset of the entry
    /// after it (the end of the index range to scan).
    pub fn bracket(&self, key: &str) -> Option<(&IndexEntry, Option<u64>)> {
        if !self.covers(key) {
            return None;
        }
        let pos = self.entries.partition_point(|e| e.key.as_str() <= key);
        let start = self.entries.get(pos.checked_sub(1)?)?;
        let end = self.entries.get(pos).map(|e| e.offset);
        Some((start, end))
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_key(w, &self.min_key)?;
        write_key(w, &self.max_key)?;
        w.write_i64::<LittleEndian>(self.max_timestamp)?;
        w.write_u64::<LittleEndian>(self.entries.len() as u64)?;
        for e in &self.entries {
            e.write_to(w)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let min_len = r.read_u64::<LittleEndian>()?;
        let min_key = read_key_body(r, min_len)?;
        let max_len = r.read_u64::<LittleEndian>()?;
        let max_key = read_key_body(r, max_len)?;
        let max_timestamp = r.read_i64::<LittleEndian>()?;
        let count = r.read_u64::<LittleEndian>()?;

        let mut entries = Vec::new();
        for _ in 0..count {
            match IndexEntry::read_from(r)? {
                Some(e) => entries.push(e),
                None => bail!("summary truncated: expected {} entries", count),
            }
        }
        if entries.is_empty() || min_key > max_key {
            bail!("corrupt summary: {} entries, range {:?}..{:?}", count, min_key, max_key);
        }
        Ok(Self {
            min_key,
            max_key,
            max_timestamp,
            entries,
        })
    }
}

fn write_key<W: Write>(w: &mut W, key: &str) -> io::Result<()> {
    w.write_u64::<LittleEndian>(key.len() as u64)?;
    w.write_all(key.as_bytes())
}

fn read_key_body<R: Read>(r: &mut R, len: u64) -> Result<String> {
    if len > MAX_KEY_SIZE as u64 {
        bail!("corrupt key length {} (max {})", len, MAX_KEY_SIZE);
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}
