// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Per-worker accept loop.
//!
//! Each worker thread owns a duplicate of the shared listening socket, a
//! single-threaded runtime, and its own slot pool; connections accepted by
//! a worker live and die on that worker. With no state shared between
//! tasks there is nothing to lock.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::LocalSet;
use tracing::{debug, info, warn};

use crate::core::{EngineConfig, EngineError, Result};
use crate::server::connection::drive;
use crate::server::handler::Handler;
use crate::server::pool::SlotPool;

/// Run one worker until shutdown is signaled. Blocks the calling thread.
pub fn run_worker(
    index: usize,
    listener: std::net::TcpListener,
    handler: Arc<dyn Handler>,
    config: EngineConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| EngineError::startup("worker runtime", err.to_string()))?;
    let local = LocalSet::new();

    local.block_on(&runtime, async move {
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        let pool = Rc::new(RefCell::new(SlotPool::new(config.max_connections)));
        info!(worker = index, "worker accepting connections");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((mut stream, peer)) => {
                        let slot = pool.borrow_mut().checkout(&config);
                        let Some(mut state) = slot else {
                            warn!(
                                worker = index,
                                %peer,
                                "{}",
                                EngineError::PoolExhausted { capacity: config.max_connections }
                            );
                            continue;
                        };

                        debug!(worker = index, %peer, in_use = pool.borrow().in_use(), "accepted");
                        let pool = Rc::clone(&pool);
                        let handler = Arc::clone(&handler);
                        let config = config.clone();
                        tokio::task::spawn_local(async move {
                            if let Err(err) =
                                drive(&mut stream, &mut state, handler.as_ref(), &config).await
                            {
                                debug!(%peer, %err, "connection closed on error");
                            }
                            pool.borrow_mut().checkin(state);
                        });
                    }
                    // Transient accept failures (e.g. the peer resetting
                    // mid-handshake) must not kill the worker.
                    Err(err) => warn!(worker = index, %err, "accept failed"),
                },
                _ = shutdown.changed() => {
                    info!(worker = index, "worker shutting down");
                    return Ok(());
                }
            }
        }
    })
}
