// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Statistics worker
//!
//! Connection tasks push one [`CompletedIo`] per serviced block request onto
//! a single queue shared by every connection. The worker drains it and keeps
//! per-side totals.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use vdisk_core::Side;

use crate::protocol::RequestKind;

/// Depth of the completion queue
pub const QUEUE_DEPTH: usize = 1024;

/// A request that finished on a connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedIo {
    pub side: Side,
    pub kind: RequestKind,
    pub handle: u64,
    pub lba: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub collisions: u32,
    pub ok: bool,
}

/// Totals for one storage processor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SideStats {
    pub reads: u64,
    pub writes: u64,
    pub write_sames: u64,
    pub failures: u64,
    pub blocks_read: u64,
    pub blocks_written: u64,
    pub bytes_transferred: u64,
    pub collisions: u64,
}

/// Totals for both storage processors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IoStats {
    pub sides: [SideStats; 2],
}

impl IoStats {
    pub fn side(&self, side: Side) -> &SideStats {
        &self.sides[side.index() as usize]
    }

    fn record(&mut self, io: &CompletedIo) {
        let stats = &mut self.sides[io.side.index() as usize];
        stats.collisions += u64::from(io.collisions);
        if !io.ok {
            stats.failures += 1;
            return;
        }
        stats.bytes_transferred += io.bytes;
        match io.kind {
            RequestKind::Read => {
                stats.reads += 1;
                stats.blocks_read += io.blocks;
            }
            RequestKind::Write => {
                stats.writes += 1;
                stats.blocks_written += io.blocks;
            }
            RequestKind::WriteSame => {
                stats.write_sames += 1;
                stats.blocks_written += io.blocks;
            }
            _ => {}
        }
    }
}

/// Create the completion queue and the stats it feeds
pub fn channel() -> (mpsc::Sender<CompletedIo>, StatsWorker) {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    (tx, StatsWorker::new(rx))
}

/// Worker that drains the completion queue
pub struct StatsWorker {
    rx: mpsc::Receiver<CompletedIo>,
    stats: Arc<Mutex<IoStats>>,
}

impl StatsWorker {
    pub fn new(rx: mpsc::Receiver<CompletedIo>) -> Self {
        Self {
            rx,
            stats: Arc::new(Mutex::new(IoStats::default())),
        }
    }

    /// Shared view of the totals
    pub fn stats(&self) -> Arc<Mutex<IoStats>> {
        Arc::clone(&self.stats)
    }

    /// Process one completion. Returns `false` once every sender is gone.
    pub async fn run_once(&mut self) -> bool {
        let Some(io) = self.rx.recv().await else {
            return false;
        };
        if io.collisions > 0 {
            tracing::warn!(
                side = %io.side,
                kind = ?io.kind,
                handle = io.handle,
                lba = io.lba,
                blocks = io.blocks,
                collisions = io.collisions,
                "request completed after colliding"
            );
        }
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(&io);
        true
    }

    /// Run until the queue closes
    pub async fn run(mut self) {
        while self.run_once().await {}
        let stats = *self.stats.lock().unwrap_or_else(|e| e.into_inner());
        for side in [Side::A, Side::B] {
            let s = stats.side(side);
            tracing::info!(
                %side,
                reads = s.reads,
                writes = s.writes,
                write_sames = s.write_sames,
                failures = s.failures,
                collisions = s.collisions,
                "stats worker stopped"
            );
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
