//! # Record - SlateKV Entry Codec
//!
//! A [`Record`] is the unit of data that flows through every layer of the
//! engine: it is appended to the WAL, held in the memtable, written to SSTable
//! data files and returned by merges. One binary layout is shared by all of
//! them.
//!
//! ## Binary Layout
//!
//! All integers are little-endian.
//!
//! ```text
//! ┌──────────┬───────────────┬───────────────┬──────────────┬────────────────┬──────┬────────┐
//! │ crc: u32 │ timestamp:i64 │ tombstone: u8 │ key_len: u64 │ value_len: u64 │ key  │ value  │
//! └──────────┴───────────────┴───────────────┴──────────────┴────────────────┴──────┴────────┘
//! ```
//!
//! `crc` is the CRC32 (IEEE) of the value bytes only. A record whose stored
//! CRC disagrees with its value is an integrity fault.
//!
//! ## Example
//!
//! ```rust
//! use record::Record;
//!
//! let rec = Record::put("user:1", b"alice".to_vec(), 42);
//! let bytes = rec.encode();
//! let back = Record::decode(&mut &bytes[..]).unwrap().unwrap();
//! assert_eq!(back, rec);
//! ```
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read};
use thiserror::Error;

/// Size of the fixed part of an encoded record.
pub const HEADER_LEN: usize = 4 + 8 + 1 + 8 + 8;

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// Errors produced while decoding or verifying a record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The stored CRC does not match the CRC of the value.
    #[error("checksum mismatch for key {key:?}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        key: String,
        stored: u32,
        computed: u32,
    },

    /// The stream ended in the middle of a record.
    #[error("truncated record")]
    Truncated,

    /// The key bytes are not valid UTF-8.
    #[error("record key is not valid utf-8")]
    InvalidKey,

    /// A length field exceeds the configured safety cap.
    #[error("record field too large: {field} is {len} bytes")]
    TooLarge { field: &'static str, len: u64 },
}

/// A single timestamped key/value entry or tombstone.
///
/// Records are immutable once built; an update is a new record with a newer
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    crc: u32,
    timestamp: i64,
    tombstone: bool,
    key: String,
    value: Vec<u8>,
}

impl Record {
    /// Builds a record and computes its checksum.
    pub fn new(key: impl Into<String>, value: Vec<u8>, timestamp: i64, tombstone: bool) -> Self {
        let crc = checksum(&value);
        Self {
            crc,
            timestamp,
            tombstone,
            key: key.into(),
            value,
        }
    }

    /// A live key/value record.
    pub fn put(key: impl Into<String>, value: Vec<u8>, timestamp: i64) -> Self {
        Self::new(key, value, timestamp, false)
    }

    /// A deletion marker. Its value is the empty sentinel.
    pub fn tombstone(key: impl Into<String>, timestamp: i64) -> Self {
        Self::new(key, Vec::new(), timestamp, true)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    #[must_use]
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Consumes the record and returns its value.
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    /// Number of bytes [`encode`](Self::encode) produces.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.key.len() + self.value.len()
    }

    /// Serializes the record into a fresh buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Appends the encoding to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.reserve(self.encoded_len());
        // Writing into a Vec cannot fail.
        let _ = buf.write_u32::<LittleEndian>(self.crc);
        let _ = buf.write_i64::<LittleEndian>(self.timestamp);
        let _ = buf.write_u8(u8::from(self.tombstone));
        let _ = buf.write_u64::<LittleEndian>(self.key.len() as u64);
        let _ = buf.write_u64::<LittleEndian>(self.value.len() as u64);
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&self.value);
    }

    /// Reads one record from `r`.
    ///
    /// # Termination
    ///
    /// - Stream ends exactly at a record boundary -> `Ok(None)`.
    /// - Stream ends inside a record -> `Err(RecordError::Truncated)`.
    /// - Stored CRC disagrees with the value -> `Err(RecordError::ChecksumMismatch)`.
    pub fn decode<R: Read>(r: &mut R) -> Result<Option<Record>, RecordError> {
        let mut header = [0u8; HEADER_LEN];
        match read_full(r, &mut header)? {
            0 => return Ok(None),
            n if n < HEADER_LEN => return Err(RecordError::Truncated),
            _ => {}
        }

        let mut h = &header[..];
        let crc = h.read_u32::<LittleEndian>()?;
        let timestamp = h.read_i64::<LittleEndian>()?;
        let tombstone = h.read_u8()? != 0;
        let key_len = h.read_u64::<LittleEndian>()?;
        let value_len = h.read_u64::<LittleEndian>()?;

        if key_len > MAX_KEY_SIZE as u64 {
            return Err(RecordError::TooLarge {
                field: "key",
                len: key_len,
            });
        }
        if value_len > MAX_VALUE_SIZE as u64 {
            return Err(RecordError::TooLarge {
                field: "value",
                len: value_len,
            });
        }

        let mut key = vec![0u8; key_len as usize];
        read_exact_or_truncated(r, &mut key)?;
        let mut value = vec![0u8; value_len as usize];
        read_exact_or_truncated(r, &mut value)?;

        let key = String::from_utf8(key).map_err(|_| RecordError::InvalidKey)?;
        let rec = Record {
            crc,
            timestamp,
            tombstone,
            key,
            value,
        };
        rec.verify()?;
        Ok(Some(rec))
    }

    /// Re-checks the stored CRC against the value.
    pub fn verify(&self) -> Result<(), RecordError> {
        let computed = checksum(&self.value);
        if computed != self.crc {
            return Err(RecordError::ChecksumMismatch {
                key: self.key.clone(),
                stored: self.crc,
                computed,
            });
        }
        Ok(())
    }
}

/// CRC32 (IEEE) of `bytes`.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Fills `buf` as far as the stream allows and returns the byte count.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_exact_or_truncated<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), RecordError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => RecordError::Truncated,
        _ => RecordError::Io(e),
    })
}
