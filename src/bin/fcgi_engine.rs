// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # FastCGI Engine CLI
//!
//! Runs the engine as a standalone FastCGI Responder behind a web server.
//!
//! ## Usage
//!
//! ```sh
//! # Listen on the default port with two workers
//! fcgi-engine
//!
//! # Custom port, one worker per CPU
//! fcgi-engine --port 9900 --workers 0
//!
//! # Verbose logging
//! RUST_LOG=fcgi_engine=debug fcgi-engine
//! ```

use std::process;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fcgi_engine::{EngineConfig, Server};

/// FastCGI Responder server
///
/// Accepts FastCGI connections from a web server, assembles requests, and
/// replies through the configured handler.
#[derive(Parser, Clone)]
#[command(name = "fcgi-engine")]
#[command(about = "FastCGI Responder server engine", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "ArcheBase")]
struct Cli {
    /// TCP port to listen on
    #[arg(long, default_value_t = EngineConfig::DEFAULT_PORT)]
    port: u16,

    /// Worker threads; 0 means one per CPU
    #[arg(long, default_value_t = EngineConfig::DEFAULT_WORKERS)]
    workers: usize,

    /// Listen backlog
    #[arg(long, default_value_t = EngineConfig::DEFAULT_BACKLOG)]
    backlog: u32,

    /// Concurrent connection cap per worker
    #[arg(long, default_value_t = EngineConfig::DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Socket read buffer size in bytes
    #[arg(long, default_value_t = EngineConfig::DEFAULT_RECV_BUFFER_SIZE)]
    recv_buffer_size: usize,

    /// Bytes preallocated per connection arena
    #[arg(long, default_value_t = EngineConfig::DEFAULT_ARENA_PREALLOCATE)]
    arena_preallocate: usize,

    /// Hard byte limit per connection arena
    #[arg(long, default_value_t = EngineConfig::DEFAULT_ARENA_LIMIT)]
    arena_limit: usize,

    /// Seconds a connection may sit idle before it is closed
    #[arg(long, default_value_t = EngineConfig::DEFAULT_IDLE_TIMEOUT.as_secs())]
    idle_timeout: u64,
}

impl Cli {
    fn into_config(self) -> EngineConfig {
        EngineConfig {
            port: self.port,
            backlog: self.backlog,
            workers: if self.workers == 0 {
                num_cpus::get()
            } else {
                self.workers
            },
            max_connections: self.max_connections,
            recv_buffer_size: self.recv_buffer_size,
            arena_preallocate: self.arena_preallocate,
            arena_limit: self.arena_limit,
            idle_timeout: Duration::from_secs(self.idle_timeout),
            ..EngineConfig::default()
        }
    }
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().into_config();
    Server::new(config).run().context("server terminated")
}

fn main() {
    let result = run();

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
