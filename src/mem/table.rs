// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! String-keyed parameter table with chained buckets.
//!
//! Keys and values are arena-resident [`ArenaBuf`] strings; entries live in
//! a `Vec` chained through `u32` indices, so the table holds no raw
//! pointers and entries stay put across resizes. The bucket array is sized
//! to a power of two and doubles when the load factor reaches 75%; a resize
//! rehashes every entry into a fresh bucket array. Nothing is freed
//! mid-flight; the table is dropped or rebuilt when its arena is rewound.
//!
//! Key equality is length plus byte-for-byte comparison, never hash alone.

use crate::core::Result;
use crate::mem::arena::{pow2_size, Arena};
use crate::mem::buffer::ArenaBuf;

/// Load factor (percent) that triggers a doubling resize after an insert.
const MAX_LOAD_PERCENT: usize = 75;

/// Sentinel for "no entry" in bucket heads and chain links.
const NIL: u32 = u32::MAX;

#[derive(Debug)]
struct Entry {
    hash: u64,
    key: ArenaBuf,
    value: ArenaBuf,
    next: u32,
}

/// String-keyed insert-or-update map for request parameters.
#[derive(Debug)]
pub struct ParamTable {
    buckets: Vec<u32>,
    entries: Vec<Entry>,
    preallocate: usize,
    allow_resize: bool,
    resizes: usize,
}

/// Polynomial rolling hash over key bytes: `h = byte + 31 * h`.
fn compute_hash(key: &[u8]) -> u64 {
    let mut hash: u64 = 0;
    for &byte in key {
        hash = (byte as u64).wrapping_add((hash << 5).wrapping_sub(hash));
    }
    hash
}

impl ParamTable {
    /// Create a table whose bucket array starts at `pow2(preallocate)`
    /// buckets. The array itself is allocated lazily on the first `set`.
    pub fn new(preallocate: usize, allow_resize: bool) -> Self {
        Self {
            buckets: Vec::new(),
            entries: Vec::new(),
            preallocate: pow2_size(preallocate.max(1)),
            allow_resize,
            resizes: 0,
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many doubling resizes have happened.
    pub fn resizes(&self) -> usize {
        self.resizes
    }

    /// Look up `key`, scanning only the bucket its hash maps to.
    pub fn get<'a>(&self, arena: &'a Arena, key: &[u8]) -> Option<&'a [u8]> {
        if self.buckets.is_empty() {
            return None;
        }

        let hash = compute_hash(key);
        let bucket = (hash & (self.buckets.len() as u64 - 1)) as usize;

        let mut index = self.buckets[bucket];
        while index != NIL {
            let entry = &self.entries[index as usize];
            if entry.hash == hash && entry.key.as_slice(arena) == key {
                return Some(entry.value.as_slice(arena));
            }
            index = entry.next;
        }

        None
    }

    /// Insert `key` → `value`, updating in place when the key exists.
    pub fn set(&mut self, arena: &Arena, key: ArenaBuf, value: ArenaBuf) -> Result<()> {
        if self.buckets.is_empty() {
            self.buckets = vec![NIL; self.preallocate];
        }

        let hash = compute_hash(key.as_slice(arena));
        let bucket = (hash & (self.buckets.len() as u64 - 1)) as usize;

        let mut tail = NIL;
        let mut index = self.buckets[bucket];
        while index != NIL {
            let found = {
                let entry = &self.entries[index as usize];
                entry.hash == hash
                    && entry.key.len() == key.len()
                    && entry.key.as_slice(arena) == key.as_slice(arena)
            };

            if found {
                let entry = &mut self.entries[index as usize];
                entry.key = key;
                entry.value = value;
                return Ok(());
            }

            tail = index;
            index = self.entries[index as usize].next;
        }

        let new_index = self.entries.len() as u32;
        self.entries.push(Entry {
            hash,
            key,
            value,
            next: NIL,
        });

        if tail == NIL {
            self.buckets[bucket] = new_index;
        } else {
            self.entries[tail as usize].next = new_index;
        }

        if self.needs_resize() {
            self.resize(self.buckets.len() * 2);
        }

        Ok(())
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter<'a>(&'a self, arena: &'a Arena) -> impl Iterator<Item = (&'a [u8], &'a [u8])> {
        self.entries
            .iter()
            .map(move |entry| (entry.key.as_slice(arena), entry.value.as_slice(arena)))
    }

    fn needs_resize(&self) -> bool {
        self.allow_resize
            && !self.buckets.is_empty()
            && self.entries.len() * 100 / self.buckets.len() >= MAX_LOAD_PERCENT
    }

    /// Double the bucket array and rehash every entry into it.
    fn resize(&mut self, new_size: usize) {
        let new_size = pow2_size(new_size);
        if new_size <= self.buckets.len() {
            return;
        }

        let mut buckets = vec![NIL; new_size];

        for (index, entry) in self.entries.iter_mut().enumerate() {
            let bucket = (entry.hash & (new_size as u64 - 1)) as usize;
            // Prepend: chain order within a bucket is not observable.
            entry.next = buckets[bucket];
            buckets[bucket] = index as u32;
        }

        self.buckets = buckets;
        self.resizes += 1;
    }
}
