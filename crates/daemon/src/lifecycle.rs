// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, connection admission, shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vdisk_core::Side;

use crate::config::{Config, ConfigError};
use crate::server::{self, ConnectionInfo, Dispatcher};
use crate::worker;

/// Bound on draining the stats worker at shutdown
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    pub listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    /// Connection tasks indexed by side
    connections: Vec<Option<JoinHandle<()>>>,
    worker: JoinHandle<()>,
    next_transfer_id: u64,
    pub start_time: Instant,
}

/// Start the daemon: bind the listener and start the stats worker
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(addr, e))?;

    let (completions, stats_worker) = worker::channel();
    let dispatcher = Dispatcher::new(config.clone(), completions, stats_worker.stats());
    let worker = tokio::spawn(stats_worker.run());

    info!(
        addr = %listener.local_addr()?,
        max_drives = config.max_drives,
        unwritten_read = ?config.unwritten_read,
        "Daemon started"
    );

    Ok(DaemonState {
        config: config.clone(),
        listener,
        dispatcher: Arc::new(dispatcher),
        connections: (0..config.max_connections.clamp(1, 2)).map(|_| None).collect(),
        worker,
        next_transfer_id: 1,
        start_time: Instant::now(),
    })
}

impl DaemonState {
    pub fn local_addr(&self) -> Result<SocketAddr, LifecycleError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Hand an accepted stream to the first free side, or refuse it.
    pub fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        let free = self
            .connections
            .iter()
            .position(|slot| slot.as_ref().is_none_or(|task| task.is_finished()));
        let Some(side) = free.and_then(|i| Side::from_index(i as u32)) else {
            warn!(%peer, "connection refused, both sides attached");
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, "Failed to set TCP_NODELAY: {}", e);
        }
        let conn = ConnectionInfo {
            side,
            transfer_id: self.next_transfer_id,
        };
        self.next_transfer_id += 1;
        info!(%peer, %side, transfer_id = conn.transfer_id, "connection accepted");

        let dispatcher = Arc::clone(&self.dispatcher);
        let task = tokio::spawn(async move {
            match server::handle_connection(dispatcher, stream, conn).await {
                Ok(()) => info!(%side, "connection closed"),
                Err(e) => error!(%side, "Error handling connection: {}", e),
            }
        });
        self.connections[side.index() as usize] = Some(task);
    }

    /// Accept and admit one connection.
    async fn accept(&mut self) -> Result<(), LifecycleError> {
        let (stream, peer) = self.listener.accept().await?;
        self.admit(stream, peer);
        Ok(())
    }

    /// Accept connections until `shutdown` resolves, then shut down.
    pub async fn serve(mut self, shutdown: impl Future<Output = ()>) -> Result<(), LifecycleError> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = self.accept() => {
                    if let Err(e) = result {
                        error!("Error accepting connection: {}", e);
                    }
                }
                _ = &mut shutdown => break,
            }
        }
        self.shutdown().await;
        Ok(())
    }

    /// Shutdown the daemon gracefully
    pub async fn shutdown(self) {
        info!("Shutting down daemon...");

        for task in self.connections.into_iter().flatten() {
            task.abort();
            let _ = task.await;
        }

        let removed = self.dispatcher.registry().remove_all();
        let stats = self.dispatcher.stats();
        info!(
            removed,
            uptime_secs = self.start_time.elapsed().as_secs(),
            spa_requests = io_count(&stats, Side::A),
            spb_requests = io_count(&stats, Side::B),
            "drives released"
        );

        // The worker finishes once the last completion sender is dropped.
        drop(self.dispatcher);
        if tokio::time::timeout(WORKER_DRAIN_TIMEOUT, self.worker)
            .await
            .is_err()
        {
            warn!("stats worker did not drain in time");
        }

        info!("Daemon shutdown complete");
    }
}

fn io_count(stats: &worker::IoStats, side: Side) -> u64 {
    let s = stats.side(side);
    s.reads + s.writes + s.write_sames
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
