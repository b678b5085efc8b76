// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Multi-worker FastCGI server.
//!
//! [`Server::run`] binds one listening socket, hands a duplicate of it to
//! every worker thread, and then waits for Ctrl-C. Each worker runs its own
//! accept loop on a single-threaded runtime (see [`reactor`]); the kernel
//! spreads incoming connections across the duplicated listeners.

pub mod connection;
pub mod handler;
pub mod pool;
pub mod reactor;

pub use handler::{Handler, OkHandler};
pub use pool::{ConnState, SlotPool};

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use tokio::net::TcpSocket;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::{EngineConfig, EngineError, Result};

/// The engine entry point: configuration plus the application handler.
pub struct Server {
    config: EngineConfig,
    handler: Arc<dyn Handler>,
}

impl Server {
    /// Server with the built-in fixed responder.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_handler(config, Arc::new(OkHandler::default()))
    }

    /// Server with a caller-supplied handler.
    pub fn with_handler(config: EngineConfig, handler: Arc<dyn Handler>) -> Self {
        Self { config, handler }
    }

    /// Bind, spawn workers, and serve until Ctrl-C.
    ///
    /// Startup failures (bind, listen, thread spawn) are returned as
    /// [`EngineError::Startup`] and nothing keeps running. After the signal
    /// arrives every worker is told to stop and joined before this returns.
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| EngineError::startup("control runtime", err.to_string()))?;

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let backlog = self.config.backlog;
        let listener = runtime
            .block_on(async {
                let socket = TcpSocket::new_v4()?;
                socket.set_reuseaddr(true)?;
                socket.bind(addr)?;
                socket.listen(backlog)?.into_std()
            })
            .map_err(|err| EngineError::startup("bind", format!("{addr}: {err}")))?;

        let workers = self.config.workers.max(1);
        info!(%addr, workers, "listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut joins = Vec::with_capacity(workers);
        for index in 0..workers {
            let listener = listener
                .try_clone()
                .map_err(|err| EngineError::startup("listener clone", err.to_string()))?;
            let handler = Arc::clone(&self.handler);
            let config = self.config.clone();
            let shutdown = shutdown_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("fcgi-worker-{index}"))
                .spawn(move || reactor::run_worker(index, listener, handler, config, shutdown))
                .map_err(|err| EngineError::startup("worker spawn", err.to_string()))?;
            joins.push(handle);
        }
        drop(shutdown_rx);

        runtime
            .block_on(tokio::signal::ctrl_c())
            .map_err(|err| EngineError::startup("signal handler", err.to_string()))?;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);

        for handle in joins {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%err, "worker exited with error"),
                Err(_) => warn!("worker thread panicked"),
            }
        }

        Ok(())
    }
}
