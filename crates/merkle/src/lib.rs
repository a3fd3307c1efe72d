//! # Merkle - SSTable Digest Tree
//!
//! A binary hash tree over the records of one SSTable. Leaves hash one block
//! each, every parent hashes the concatenation of its two children. A row with
//! an odd number of nodes is padded with the hash of the empty string before
//! it is paired, so every parent has exactly two children.
//!
//! ```text
//!                 root
//!               /      \
//!          H(a|b)       H(c|e)
//!          /   \        /    \
//!        H(a) H(b)    H(c)   e = H("")   (padding)
//! ```
//!
//! ## File format
//!
//! Nodes are written breadth-first from the root as lowercase hex digests,
//! each terminated by `;`. Reading a file back rebuilds the same shape:
//! padding nodes are recognised by their digest, and the nodes of the
//! deepest row are the ones left over once the hashes run out.
//!
//! The tree is for audit only. Lookups never consult it.
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

/// A SHA-256 digest.
pub type Hash = [u8; 32];

#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid digest at node {index}: {reason}")]
    InvalidDigest { index: usize, reason: String },

    #[error("malformed tree: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    hash: Hash,
    children: Option<(usize, usize)>,
}

/// Arena-backed merkle tree.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    nodes: Vec<Node>,
    root: Option<usize>,
}

/// SHA-256 of `data`.
#[must_use]
pub fn hash(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

fn empty_hash() -> Hash {
    hash(&[])
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

impl MerkleTree {
    /// Builds the tree bottom-up from `blocks`. No blocks yields an empty tree.
    pub fn build<I, B>(blocks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut tree = MerkleTree::default();
        let mut row: Vec<usize> = blocks
            .into_iter()
            .map(|b| tree.push_leaf(hash(b.as_ref())))
            .collect();
        if row.is_empty() {
            return tree;
        }

        loop {
            if row.len() % 2 != 0 {
                row.push(tree.push_leaf(empty_hash()));
            }
            let next: Vec<usize> = row
                .chunks_exact(2)
                .map(|pair| tree.push_parent(pair[0], pair[1]))
                .collect();
            if next.len() == 1 {
                tree.root = Some(next[0]);
                return tree;
            }
            row = next;
        }
    }

    /// Root digest, `None` for an empty tree.
    #[must_use]
    pub fn root(&self) -> Option<Hash> {
        self.root.map(|i| self.nodes[i].hash)
    }

    #[must_use]
    pub fn root_hex(&self) -> Option<String> {
        self.root().map(hex::encode)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Digests in breadth-first order from the root.
    pub fn breadth_first(&self) -> Vec<Hash> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut queue: VecDeque<usize> = self.root.into_iter().collect();
        while let Some(i) = queue.pop_front() {
            let node = &self.nodes[i];
            out.push(node.hash);
            if let Some((l, r)) = node.children {
                queue.push_back(l);
                queue.push_back(r);
            }
        }
        out
    }

    /// Rebuilds a tree from its serialized form.
    pub fn parse(s: &str) -> Result<Self, MerkleError> {
        let mut hashes = Vec::new();
        for (index, part) in s.trim().split(';').enumerate() {
            if part.is_empty() {
                continue;
            }
            let bytes = hex::decode(part).map_err(|e| MerkleError::InvalidDigest {
                index,
                reason: e.to_string(),
            })?;
            let digest: Hash = bytes.try_into().map_err(|b: Vec<u8>| MerkleError::InvalidDigest {
                index,
                reason: format!("expected 32 bytes, got {}", b.len()),
            })?;
            hashes.push(digest);
        }
        Self::from_breadth_first(hashes)
    }

    fn from_breadth_first(hashes: Vec<Hash>) -> Result<Self, MerkleError> {
        let mut tree = MerkleTree::default();
        if hashes.is_empty() {
            return Ok(tree);
        }
        let pad = empty_hash();
        let total = hashes.len();
        tree.nodes = hashes
            .into_iter()
            .map(|hash| Node {
                hash,
                children: None,
            })
            .collect();
        tree.root = Some(0);

        let mut next = 1;
        let mut queue = VecDeque::from([0usize]);
        while let Some(i) = queue.pop_front() {
            if next >= total || tree.nodes[i].hash == pad {
                continue;
            }
            if next + 1 >= total {
                return Err(MerkleError::Malformed(format!(
                    "node {} has a single child",
                    i
                )));
            }
            tree.nodes[i].children = Some((next, next + 1));
            queue.push_back(next);
            queue.push_back(next + 1);
            next += 2;
        }
        if next != total {
            return Err(MerkleError::Malformed(format!(
                "{} digests left unattached",
                total - next
            )));
        }
        Ok(tree)
    }

    /// Writes the serialized tree to `path`, syncing it to disk.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut f = fs::File::create(path)?;
        f.write_all(self.to_string().as_bytes())?;
        f.sync_all()
    }

    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self, MerkleError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    fn push_leaf(&mut self, hash: Hash) -> usize {
        self.nodes.push(Node {
            hash,
            children: None,
        });
        self.nodes.len() - 1
    }

    fn push_parent(&mut self, left: usize, right: usize) -> usize {
        let hash = hash_pair(&self.nodes[left].hash, &self.nodes[right].hash);
        self.nodes.push(Node {
            hash,
            children: Some((left, right)),
        });
        self.nodes.len() - 1
    }
}

impl fmt::Display for MerkleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digest in self.breadth_first() {
            write!(f, "{};", hex::encode(digest))?;
        }
        Ok(())
    }
}
