// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Bump allocator over a growable chain of memory blocks.
//!
//! The arena backs all per-connection allocation. Allocations are never
//! freed individually: [`Arena::rewind`] resets every block's used counter
//! between requests, and dropping the arena releases the whole chain. A
//! connection that has reached its working-set size therefore serves
//! steady-state traffic without acquiring any new memory.
//!
//! Allocations are returned as [`RawBuf`] handles (block index, offset,
//! length) rather than references, so holding a handle does not borrow the
//! arena. Handles are resolved through [`Arena::bytes`] /
//! [`Arena::bytes_mut`] and stay valid until the next rewind.
//!
//! The linear first-fit scan over blocks is a deliberate simplicity
//! trade-off: block count stays small because oversized requests get their
//! own power-of-two block.

use crate::core::{EngineError, Result};

/// Round `size` up to the next power of two. `0` and `1` both map to `1`.
pub fn pow2_size(size: usize) -> usize {
    size.max(1).checked_next_power_of_two().unwrap_or(usize::MAX)
}

/// One fixed-capacity block in the arena chain.
#[derive(Debug)]
struct Block {
    buf: Box<[u8]>,
    used: usize,
}

impl Block {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.used
    }

    /// Bump-allocate `size` bytes from this block, if they fit.
    fn allocate(&mut self, size: usize) -> Option<usize> {
        if size > self.remaining() {
            return None;
        }

        let offset = self.used;
        self.used += size;
        Some(offset)
    }
}

/// Handle to a single arena allocation.
///
/// A handle is a plain value: it does not borrow the arena and must only be
/// resolved against the arena it was allocated from. It is invalidated by
/// [`Arena::rewind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBuf {
    block: u32,
    offset: u32,
    len: u32,
}

impl RawBuf {
    /// Handle for a zero-length allocation.
    pub const EMPTY: RawBuf = RawBuf {
        block: 0,
        offset: 0,
        len: 0,
    };

    /// Length of the allocation in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the allocation is zero-length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bump allocator owning a chain of memory blocks.
#[derive(Debug)]
pub struct Arena {
    blocks: Vec<Block>,
    preallocate: usize,
    limit: usize,
    allocated: usize,
    used: usize,
    allocations: usize,
}

impl Arena {
    /// Create an arena that grows blocks of at least `preallocate` bytes.
    pub fn new(preallocate: usize) -> Self {
        Self::with_limit(preallocate, usize::MAX)
    }

    /// Create an arena with a hard cap on total backing memory.
    ///
    /// Exceeding the cap makes [`Arena::allocate`] fail with
    /// [`EngineError::ArenaExhausted`], which callers treat as a recoverable
    /// per-request condition.
    pub fn with_limit(preallocate: usize, limit: usize) -> Self {
        Self {
            blocks: Vec::new(),
            preallocate: pow2_size(preallocate.max(1)),
            limit,
            allocated: 0,
            used: 0,
            allocations: 0,
        }
    }

    /// Allocate `size` bytes, scanning existing blocks in chain order and
    /// appending a new block on miss.
    ///
    /// A request larger than half the preallocation size gets its own block
    /// of `pow2(size * 2)` bytes so it does not crowd out small allocations.
    pub fn allocate(&mut self, size: usize) -> Result<RawBuf> {
        if size == 0 {
            return Ok(RawBuf::EMPTY);
        }

        for (index, block) in self.blocks.iter_mut().enumerate() {
            if let Some(offset) = block.allocate(size) {
                self.used += size;
                self.allocations += 1;
                return Ok(RawBuf {
                    block: index as u32,
                    offset: offset as u32,
                    len: size as u32,
                });
            }
        }

        let block_size = if size > self.preallocate / 2 {
            pow2_size(size.saturating_mul(2))
        } else {
            self.preallocate
        };

        if self.allocated.saturating_add(block_size) > self.limit {
            return Err(EngineError::arena_exhausted(size, self.limit));
        }

        let mut block = Block::new(block_size);
        let offset = block
            .allocate(size)
            .ok_or_else(|| EngineError::arena_exhausted(size, self.limit))?;

        self.allocated += block_size;
        self.used += size;
        self.allocations += 1;
        self.blocks.push(block);

        Ok(RawBuf {
            block: (self.blocks.len() - 1) as u32,
            offset: offset as u32,
            len: size as u32,
        })
    }

    /// Reset every block's used counter without freeing anything.
    ///
    /// All outstanding handles become dangling; callers drop them alongside
    /// the request state they belong to.
    pub fn rewind(&mut self) {
        for block in &mut self.blocks {
            block.used = 0;
        }
        self.used = 0;
        self.allocations = 0;
    }

    /// Resolve a handle to its bytes.
    pub fn bytes(&self, handle: RawBuf) -> &[u8] {
        if handle.is_empty() {
            return &[];
        }

        let block = &self.blocks[handle.block as usize];
        let start = handle.offset as usize;
        &block.buf[start..start + handle.len as usize]
    }

    /// Resolve a handle to its bytes, mutably.
    pub fn bytes_mut(&mut self, handle: RawBuf) -> &mut [u8] {
        if handle.is_empty() {
            return &mut [];
        }

        let block = &mut self.blocks[handle.block as usize];
        let start = handle.offset as usize;
        &mut block.buf[start..start + handle.len as usize]
    }

    /// Copy `len` bytes between two allocations of this arena.
    ///
    /// Both handles may live in the same block, so the copy has to go
    /// through the arena rather than through two slice borrows.
    ///
    /// # Panics
    ///
    /// Panics if either range is out of bounds of its handle.
    pub fn copy(&mut self, src: RawBuf, src_off: usize, dst: RawBuf, dst_off: usize, len: usize) {
        if len == 0 {
            return;
        }

        assert!(src_off + len <= src.len(), "source range out of bounds");
        assert!(dst_off + len <= dst.len(), "destination range out of bounds");

        let src_start = src.offset as usize + src_off;
        let dst_start = dst.offset as usize + dst_off;

        if src.block == dst.block {
            let buf = &mut self.blocks[src.block as usize].buf;
            buf.copy_within(src_start..src_start + len, dst_start);
        } else {
            let (a, b) = (src.block as usize, dst.block as usize);
            let (low, high) = (a.min(b), a.max(b));
            let (head, tail) = self.blocks.split_at_mut(high);
            let (first, second) = (&mut head[low], &mut tail[0]);
            let (src_block, dst_block) = if a < b {
                (first, second)
            } else {
                (second, first)
            };
            dst_block.buf[dst_start..dst_start + len]
                .copy_from_slice(&src_block.buf[src_start..src_start + len]);
        }
    }

    /// Total bytes of backing memory acquired so far.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Bytes handed out since the last rewind.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Allocations served since the last rewind.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Number of blocks in the chain.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}
