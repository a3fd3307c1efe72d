//! # Bloom Filter
//!
//! Per-SSTable membership sketch. A negative answer is exact; a positive
//! answer may be a false positive at roughly the rate the filter was sized
//! for.
//!
//! Each SSTable stores its filter in a dedicated `filter` file. On lookup the
//! filter is consulted before the summary and index, so a table that cannot
//! hold the key costs no disk I/O.
//!
//! Bit positions come from one 128-bit xxh3 hash split into two halves and
//! combined by double hashing: `pos(i) = h1 + i * h2 (mod m)`.
//!
//! ## Example
//!
//! ```rust
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 0.01);
//! bf.insert(b"hello");
//! assert!(bf.may_contain(b"hello"));
//! ```
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use xxhash_rust::xxh3::xxh3_128;

/// Magic prefix of a serialized filter ("SKBF").
const MAGIC: u32 = 0x534B_4246;

/// Upper bound on the bit array accepted when deserializing (128 MiB).
const MAX_FILTER_BYTES: u64 = 128 * 1024 * 1024;

/// A bloom filter backed by a `u64` word array and `k` derived hash functions.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    words: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Sizes a filter for `expected_items` keys at `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = -n * ln(p) / ln(2)^2, k = (m / n) * ln(2)
        let n = expected_items as f64;
        let ln2 = std::f64::consts::LN_2;
        let m = ((-n * false_positive_rate.ln()) / (ln2 * ln2)).ceil() as u64;
        let m = m.max(64);
        let k = ((m as f64 / n) * ln2).round().max(1.0) as u32;

        Self {
            words: vec![0u64; m.div_ceil(64) as usize],
            num_bits: m,
            num_hashes: k,
        }
    }

    /// Adds `key` to the set.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let pos = self.position(h1, h2, i);
            self.words[(pos / 64) as usize] |= 1u64 << (pos % 64);
        }
    }

    /// `false` means `key` was never inserted.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        (0..self.num_hashes).all(|i| {
            let pos = self.position(h1, h2, i);
            self.words[(pos / 64) as usize] & (1u64 << (pos % 64)) != 0
        })
    }

    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Size of the serialized filter in bytes.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        4 + 8 + 4 + 4 + self.words.len() * 8
    }

    /// Serializes the filter.
    ///
    /// ```text
    /// [magic: u32][num_bits: u64][num_hashes: u32][word_count: u32][words: u64 * word_count]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(MAGIC)?;
        w.write_u64::<LittleEndian>(self.num_bits)?;
        w.write_u32::<LittleEndian>(self.num_hashes)?;
        w.write_u32::<LittleEndian>(self.words.len() as u32)?;
        for word in &self.words {
            w.write_u64::<LittleEndian>(*word)?;
        }
        Ok(())
    }

    /// Deserializes a filter written by [`write_to`](Self::write_to).
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(invalid(format!("bad bloom filter magic: {:#010x}", magic)));
        }
        let num_bits = r.read_u64::<LittleEndian>()?;
        let num_hashes = r.read_u32::<LittleEndian>()?;
        let word_count = r.read_u32::<LittleEndian>()? as u64;

        if word_count * 8 > MAX_FILTER_BYTES {
            return Err(invalid(format!(
                "bloom filter too large: {} bytes",
                word_count * 8
            )));
        }
        if num_bits == 0 || num_bits > word_count * 64 || num_hashes == 0 {
            return Err(invalid(format!(
                "inconsistent bloom filter header: {} bits, {} words, {} hashes",
                num_bits, word_count, num_hashes
            )));
        }

        let mut words = vec![0u64; word_count as usize];
        r.read_u64_into::<LittleEndian>(&mut words)?;

        Ok(Self {
            words,
            num_bits,
            num_hashes,
        })
    }

    fn position(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("words", &self.words.len())
            .finish()
    }
}

fn hash_pair(key: &[u8]) -> (u64, u64) {
    let h = xxh3_128(key);
    // An even step would only ever visit half of an even-sized bit array.
    (h as u64, ((h >> 64) as u64) | 1)
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
