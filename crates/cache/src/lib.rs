//! # Cache - LRU Read Cache
//!
//! A bounded `key -> value` cache in front of the SSTable levels. Entries live
//! in an arena (`Vec<Slot>`) linked into a doubly-linked recency list by
//! index; a `HashMap` maps each key to its slot.
//!
//! ```text
//! head (most recent)                          tail (least recent)
//!   [c] <-> [a] <-> [d] <-> [b]
//!                               ^ evicted when a new key arrives at capacity
//! ```
//!
//! Slots freed by [`LruCache::remove`] are recycled by the next insert, so
//! the arena never grows past `capacity`.

use std::collections::HashMap;

#[derive(Debug)]
struct Slot {
    key: String,
    value: Vec<u8>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub struct LruCache {
    capacity: usize,
    slots: Vec<Slot>,
    free: Vec<usize>,
    map: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruCache {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be > 0");
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            map: HashMap::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    /// Inserts or replaces `key`, making it the most recently used entry.
    ///
    /// Returns the evicted key, if the insert pushed one out.
    pub fn add(&mut self, key: impl Into<String>, value: Vec<u8>) -> Option<String> {
        let key = key.into();
        if let Some(&idx) = self.map.get(&key) {
            self.slots[idx].value = value;
            self.promote(idx);
            return None;
        }

        let evicted = if self.map.len() == self.capacity {
            self.evict_tail()
        } else {
            None
        };

        let slot = Slot {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(i) => {
                self.slots[i] = slot;
                i
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.push_front(idx);
        self.map.insert(key, idx);
        evicted
    }

    /// Looks up `key` and marks it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&[u8]> {
        let idx = *self.map.get(key)?;
        self.promote(idx);
        Some(&self.slots[idx].value)
    }

    /// Looks up `key` without touching recency.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<&[u8]> {
        self.map.get(key).map(|&i| self.slots[i].value.as_slice())
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free.push(idx);
        Some(std::mem::take(&mut self.slots[idx].value))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::successors(self.head, move |&i| self.slots[i].next)
            .map(move |i| self.slots[i].key.as_str())
    }

    fn evict_tail(&mut self) -> Option<String> {
        let idx = self.tail?;
        self.unlink(idx);
        self.free.push(idx);
        let key = std::mem::take(&mut self.slots[idx].key);
        self.slots[idx].value = Vec::new();
        self.map.remove(&key);
        Some(key)
    }

    fn promote(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.head;
        match self.head {
            Some(h) => self.slots[h].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }
}
