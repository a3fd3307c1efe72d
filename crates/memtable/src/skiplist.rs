//! Arena-backed skip list keyed by record key.
//!
//! Nodes live in a `Vec` and link to each other by index, forward and
//! backward, at every level they participate in. Level 0 is a doubly linked
//! list of every node in key order.
//!
//! ```text
//! Level 2:  HEAD ──────────► c ─────────────────► NIL
//! Level 1:  HEAD ──► a ────► c ──────────► f ───► NIL
//! Level 0:  HEAD ──► a ──► b ──► c ──► d ──► f ──► NIL   (tail = f)
//! ```
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use record::Record;
use std::cmp::Ordering;

#[derive(Debug)]
struct Node {
    record: Record,
    tombstone: bool,
    forward: Vec<Option<usize>>,
    backward: Vec<Option<usize>>,
}

/// Predecessors of a key at every level, as found by [`SkipList::find`].
///
/// `None` at a level means the search never left the head there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    preds: Vec<Option<usize>>,
    hit: Option<usize>,
}

impl SearchPath {
    /// Number of levels the search walked.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.preds.len()
    }
}

pub struct SkipList {
    nodes: Vec<Node>,
    head: Vec<Option<usize>>,
    tail: Option<usize>,
    rng: StdRng,
}

impl SkipList {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A list whose level choices are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            nodes: Vec::new(),
            head: vec![None],
            tail: None,
            rng,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Current number of levels, always at least 1.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.head.len()
    }

    /// Searches for `key`, descending from the highest level.
    pub fn find(&self, key: &str) -> (bool, SearchPath) {
        let levels = self.head.len();
        let mut preds = vec![None; levels];
        let mut cur: Option<usize> = None;

        for level in (0..levels).rev() {
            loop {
                let next = self.next_of(cur, level);
                match next {
                    Some(n) if self.nodes[n].record.key() < key => cur = Some(n),
                    _ => break,
                }
            }
            preds[level] = cur;
        }

        let hit = self
            .next_of(cur, 0)
            .filter(|&n| self.nodes[n].record.key().cmp(key) == Ordering::Equal);
        (hit.is_some(), SearchPath { preds, hit })
    }

    /// Stored record and its tombstone flag.
    pub fn get(&self, key: &str) -> Option<(&Record, bool)> {
        let (_, path) = self.find(key);
        path.hit.map(|i| {
            let node = &self.nodes[i];
            (&node.record, node.tombstone)
        })
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.find(key).0
    }

    /// Inserts `record`, or replaces the record stored under its key in place.
    pub fn insert(&mut self, record: Record, tombstone: bool) {
        let record = if tombstone && !record.is_tombstone() {
            Record::tombstone(record.key(), record.timestamp())
        } else {
            record
        };
        let tombstone = tombstone || record.is_tombstone();

        let (found, path) = self.find(record.key());
        if let (true, Some(i)) = (found, path.hit) {
            let node = &mut self.nodes[i];
            node.record = record;
            node.tombstone = tombstone;
            return;
        }
        self.splice(record, tombstone, path.preds);
    }

    /// Marks the key of `record` deleted.
    ///
    /// A present key has its stored record replaced by `record`; an absent
    /// key gets a new tombstone node. Returns whether the key was present.
    pub fn delete(&mut self, record: Record) -> bool {
        let present = self.contains(record.key());
        self.insert(record, true);
        present
    }

    /// Records in key order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            front: self.head[0],
            back: self.tail,
            remaining: self.nodes.len(),
        }
    }

    /// Removes every node and returns their records in key order.
    pub fn drain(&mut self) -> Vec<Record> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut cur = self.head[0];
        while let Some(i) = cur {
            order.push(i);
            cur = self.nodes[i].forward[0];
        }

        let mut slots: Vec<Option<Record>> = std::mem::take(&mut self.nodes)
            .into_iter()
            .map(|n| Some(n.record))
            .collect();
        self.head = vec![None];
        self.tail = None;

        order.into_iter().filter_map(|i| slots[i].take()).collect()
    }

    fn next_of(&self, node: Option<usize>, level: usize) -> Option<usize> {
        match node {
            Some(i) => self.nodes[i].forward[level],
            None => self.head[level],
        }
    }

    fn set_next(&mut self, node: Option<usize>, level: usize, next: Option<usize>) {
        match node {
            Some(i) => self.nodes[i].forward[level] = next,
            None => self.head[level] = next,
        }
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while self.rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    fn splice(&mut self, record: Record, tombstone: bool, mut preds: Vec<Option<usize>>) {
        let level = self.random_level();
        while self.head.len() < level {
            self.head.push(None);
            preds.push(None);
        }

        let idx = self.nodes.len();
        self.nodes.push(Node {
            record,
            tombstone,
            forward: vec![None; level],
            backward: vec![None; level],
        });

        for (l, &pred) in preds.iter().enumerate().take(level) {
            let next = self.next_of(pred, l);
            self.nodes[idx].forward[l] = next;
            self.nodes[idx].backward[l] = pred;
            self.set_next(pred, l, Some(idx));
            match next {
                Some(n) => self.nodes[n].backward[l] = Some(idx),
                None if l == 0 => self.tail = Some(idx),
                None => {}
            }
        }
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SkipList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipList")
            .field("len", &self.nodes.len())
            .field("levels", &self.head.len())
            .finish()
    }
}

/// Double-ended iterator over level 0.
pub struct Iter<'a> {
    list: &'a SkipList,
    front: Option<usize>,
    back: Option<usize>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let i = self.front?;
        self.front = self.list.nodes[i].forward[0];
        self.remaining -= 1;
        Some(&self.list.nodes[i].record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let i = self.back?;
        self.back = self.list.nodes[i].backward[0];
        self.remaining -= 1;
        Some(&self.list.nodes[i].record)
    }
}

impl ExactSizeIterator for Iter<'_> {}
