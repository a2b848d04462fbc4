// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-flight request tracking and overlap detection.
//!
//! Every READ/WRITE/WRITE_SAME is registered for exactly as long as it is
//! being serviced. Registering scans the requests already in flight on the
//! same drive: overlapping reads are only counted, while any overlap that
//! involves a write bumps the collision counter of both requests.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;
use vdisk_core::{BlockIo, Side};

use crate::protocol::RequestKind;

/// A request being serviced
#[derive(Debug)]
pub struct InFlight {
    pub id: u64,
    pub kind: RequestKind,
    pub handle: u64,
    pub io: BlockIo,
    pub side: Side,
    pub context: u64,
    collisions: AtomicU32,
}

impl InFlight {
    pub fn collisions(&self) -> u32 {
        self.collisions.load(Ordering::Relaxed)
    }

    fn is_write(&self) -> bool {
        matches!(self.kind, RequestKind::Write | RequestKind::WriteSame)
    }
}

/// Description of a request about to be serviced
#[derive(Debug, Clone, Copy)]
pub struct IoRequest {
    pub kind: RequestKind,
    pub handle: u64,
    pub io: BlockIo,
    pub side: Side,
    pub context: u64,
}

/// Counters across all drives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionCounts {
    pub read_overlaps: u64,
    pub write_collisions: u64,
}

/// Requests currently in flight
#[derive(Debug, Default)]
pub struct OutstandingTable {
    entries: Mutex<Vec<Arc<InFlight>>>,
    next_id: AtomicU64,
    read_overlaps: AtomicU64,
    write_collisions: AtomicU64,
}

impl OutstandingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Arc<InFlight>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> CollisionCounts {
        CollisionCounts {
            read_overlaps: self.read_overlaps.load(Ordering::Relaxed),
            write_collisions: self.write_collisions.load(Ordering::Relaxed),
        }
    }

    /// Check `request` against everything in flight, then track it until the
    /// returned guard drops.
    pub fn register(self: &Arc<Self>, request: IoRequest) -> InFlightGuard {
        let entry = Arc::new(InFlight {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind: request.kind,
            handle: request.handle,
            io: request.io,
            side: request.side,
            context: request.context,
            collisions: AtomicU32::new(0),
        });

        let mut entries = self.entries();
        for other in entries
            .iter()
            .filter(|o| o.handle == entry.handle && o.io.overlaps(&entry.io))
        {
            if !entry.is_write() && !other.is_write() {
                self.read_overlaps.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            other.collisions.fetch_add(1, Ordering::Relaxed);
            entry.collisions.fetch_add(1, Ordering::Relaxed);
            self.write_collisions.fetch_add(1, Ordering::Relaxed);
            warn!(
                handle = entry.handle,
                new_kind = ?entry.kind,
                new_side = %entry.side,
                new_lba = entry.io.lba,
                new_blocks = entry.io.blocks,
                new_context = entry.context,
                old_kind = ?other.kind,
                old_side = %other.side,
                old_lba = other.io.lba,
                old_blocks = other.io.blocks,
                old_context = other.context,
                "overlapping I/O collision"
            );
        }
        entries.push(Arc::clone(&entry));
        drop(entries);

        InFlightGuard {
            table: Arc::clone(self),
            entry,
        }
    }

    fn release(&self, id: u64) {
        self.entries().retain(|e| e.id != id);
    }
}

/// Keeps a request in the outstanding table
#[derive(Debug)]
pub struct InFlightGuard {
    table: Arc<OutstandingTable>,
    entry: Arc<InFlight>,
}

impl InFlightGuard {
    pub fn entry(&self) -> &InFlight {
        &self.entry
    }

    pub fn collisions(&self) -> u32 {
        self.entry.collisions()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.table.release(self.entry.id);
    }
}

#[cfg(test)]
#[path = "collision_tests.rs"]
mod tests;
