// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Per-connection memory: bump arena, growable buffer, parameter table.
//!
//! Everything in this module is scoped to one connection and reclaimed in
//! bulk by rewinding the connection's [`Arena`] between requests.

pub mod arena;
pub mod buffer;
pub mod table;

pub use arena::{pow2_size, Arena, RawBuf};
pub use buffer::{ArenaBuf, FmtArg};
pub use table::ParamTable;
