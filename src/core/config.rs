// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Engine configuration.
//!
//! All knobs are fixed at startup; there is no runtime reconfiguration
//! surface. Defaults reproduce the reference deployment: port 9000, two
//! workers, 1024 connection slots per worker, a 100 KiB arena preallocation
//! per connection.

use std::time::Duration;

/// Startup parameters for the server engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TCP port to listen on (all interfaces).
    pub port: u16,
    /// Listen backlog.
    pub backlog: u32,
    /// Number of worker threads sharing the listening socket.
    pub workers: usize,
    /// Connection slots per worker. A new connection is refused once every
    /// slot is busy.
    pub max_connections: usize,
    /// Size of the per-connection receive buffer.
    pub recv_buffer_size: usize,
    /// Bytes preallocated by each connection arena. Steady-state traffic
    /// should fit a request's working set in this much memory.
    pub arena_preallocate: usize,
    /// Hard byte limit per connection arena. Exceeding it aborts the
    /// in-flight request instead of growing without bound.
    pub arena_limit: usize,
    /// Initial bucket count hint for the parameter table.
    pub param_table_preallocate: usize,
    /// How long a connection may sit idle between reads before it is closed
    /// and its slot reclaimed.
    pub idle_timeout: Duration,
}

impl EngineConfig {
    /// Default listening port.
    pub const DEFAULT_PORT: u16 = 9000;
    /// Default listen backlog.
    pub const DEFAULT_BACKLOG: u32 = 1024;
    /// Default worker count.
    pub const DEFAULT_WORKERS: usize = 2;
    /// Default connection slots per worker.
    pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;
    /// Default receive buffer size.
    pub const DEFAULT_RECV_BUFFER_SIZE: usize = 10240;
    /// Default arena preallocation per connection.
    pub const DEFAULT_ARENA_PREALLOCATE: usize = 102_400;
    /// Default hard limit per connection arena.
    pub const DEFAULT_ARENA_LIMIT: usize = 16 * 1024 * 1024;
    /// Default parameter table size hint.
    pub const DEFAULT_PARAM_TABLE_PREALLOCATE: usize = 32;
    /// Default idle read timeout.
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: Self::DEFAULT_PORT,
            backlog: Self::DEFAULT_BACKLOG,
            workers: Self::DEFAULT_WORKERS,
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            recv_buffer_size: Self::DEFAULT_RECV_BUFFER_SIZE,
            arena_preallocate: Self::DEFAULT_ARENA_PREALLOCATE,
            arena_limit: Self::DEFAULT_ARENA_LIMIT,
            param_table_preallocate: Self::DEFAULT_PARAM_TABLE_PREALLOCATE,
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        }
    }
}
