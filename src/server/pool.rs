// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Per-connection state and the bounded slot pool that recycles it.
//!
//! Each accepted connection checks out one [`ConnState`]; the pool caps how
//! many can be live at once and hands back rewound slots so arenas keep
//! their grown blocks across connections. Each worker owns its own pool, so
//! no synchronization is involved.

use crate::core::EngineConfig;
use crate::mem::Arena;
use crate::proto::{RecordParser, Request};

/// Everything one connection needs: its arena, a record parser, and the
/// request being assembled.
#[derive(Debug)]
pub struct ConnState {
    pub arena: Arena,
    pub parser: RecordParser,
    pub request: Request,
}

impl ConnState {
    fn new(config: &EngineConfig) -> Self {
        Self {
            arena: Arena::with_limit(config.arena_preallocate, config.arena_limit),
            parser: RecordParser::new(),
            request: Request::new(config.param_table_preallocate),
        }
    }

    /// Make the slot ready for its next request. The arena keeps its
    /// blocks; only the used counters reset.
    pub fn reset(&mut self) {
        self.arena.rewind();
        self.parser.reset();
        self.request.reset();
    }
}

/// Bounded pool of recycled connection slots.
#[derive(Debug)]
pub struct SlotPool {
    free: Vec<ConnState>,
    capacity: usize,
    in_use: usize,
}

impl SlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            capacity,
            in_use: 0,
        }
    }

    /// Connections currently holding a slot.
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Slot limit this pool enforces.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take a slot, or `None` when the pool is at capacity.
    pub fn checkout(&mut self, config: &EngineConfig) -> Option<ConnState> {
        if self.in_use >= self.capacity {
            return None;
        }
        self.in_use += 1;
        Some(match self.free.pop() {
            Some(slot) => slot,
            None => ConnState::new(config),
        })
    }

    /// Return a slot for reuse. The slot is reset here so a pooled arena
    /// never leaks a previous connection's data into the next checkout.
    pub fn checkin(&mut self, mut slot: ConnState) {
        slot.reset();
        self.in_use -= 1;
        self.free.push(slot);
    }
}
