// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # FastCGI Engine
//!
//! A FastCGI Responder server built around per-connection bump arenas and a
//! resumable binary record parser.
//!
//! The engine is organized into three layers:
//! - **Memory** in [`mem`]: the bump [`Arena`](mem::Arena) with
//!   index-stable handles, the growable [`ArenaBuf`](mem::ArenaBuf), and
//!   the string-keyed [`ParamTable`](mem::ParamTable)
//! - **Protocol** in [`proto`]: the record model, the incremental
//!   [`RecordParser`](proto::RecordParser), the [`Request`](proto::Request)
//!   assembler, and response framing
//! - **Server** in [`server`]: connection slots, the per-worker accept
//!   loop, and the [`Handler`](server::Handler) seam for applications
//!
//! Every byte a request touches comes out of one arena that is rewound
//! when the request completes, so steady-state traffic allocates nothing.
//!
//! ## Example: Serving a Fixed Response
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use fcgi_engine::{EngineConfig, Server};
//!
//! let server = Server::new(EngineConfig::default());
//! server.run()?;
//! # Ok(())
//! # }
//! ```

// Configuration and errors
pub mod core;

// Re-export core types for convenience
pub use crate::core::{EngineConfig, EngineError, Result};

// Per-connection memory
pub mod mem;

// FastCGI wire protocol
pub mod proto;

// Reactor, connection handling, and the application seam
pub mod server;

pub use server::{Handler, OkHandler, Server};
