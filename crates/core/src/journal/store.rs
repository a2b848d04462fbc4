// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutating journal operations: write and write-zero-pattern
//!
//! Every mutation is staged first. All buffers a merge needs are allocated
//! and filled before any existing record is removed, so an allocation failure
//! leaves the journal exactly as it was.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use super::arena::{Arena, RecordId};
use super::{alloc, alloc_zeroed, JournalError, Record, RecordKind};
use crate::codec::{self, is_compressed_block_size, stored_block_len};
use crate::pattern::EncryptionKey;

/// Usage counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JournalStats {
    pub records: usize,
    pub bytes_allocated: usize,
}

/// Ordered, non-overlapping records of one virtual disk
#[derive(Debug)]
pub struct Journal {
    pub(super) arena: Arena<Record>,
    pub(super) order: BTreeMap<u64, RecordId>,
    bytes_allocated: usize,
    verify: bool,
}

/// What a mutation wants to place over its range
#[derive(Debug, Clone, Copy)]
enum Incoming<'a> {
    Data { block_size: u32, bytes: &'a [u8] },
    Repeat { block_size: u32, block: &'a [u8] },
    Zero { key: Option<&'a EncryptionKey>, unmapped: bool },
}

impl Incoming<'_> {
    fn can_merge(&self, kind: &RecordKind) -> bool {
        match (self, kind) {
            (Incoming::Data { block_size, .. }, RecordKind::Data { block_size: b, .. }) => {
                block_size == b
            }
            (
                Incoming::Repeat { block_size, block },
                RecordKind::Repeat {
                    block_size: b,
                    block: k,
                    ..
                },
            ) => block_size == b && *block == k.as_slice(),
            (
                Incoming::Zero { key, unmapped },
                RecordKind::Zero {
                    key: k,
                    unmapped: u,
                },
            ) => *key == k.as_ref() && unmapped == u,
            _ => false,
        }
    }
}

/// A record overlapping or adjacent to a mutation's range
#[derive(Debug, Clone, Copy)]
struct Touched {
    id: RecordId,
    start: u64,
    end: u64,
    compatible: bool,
    overlaps: bool,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Journal {
    /// Create an empty journal. `verify` enables integrity checks of
    /// compressed buffers on write.
    pub fn new(verify: bool) -> Self {
        Self {
            arena: Arena::new(),
            order: BTreeMap::new(),
            bytes_allocated: 0,
            verify,
        }
    }

    pub fn stats(&self) -> JournalStats {
        JournalStats {
            records: self.arena.len(),
            bytes_allocated: self.bytes_allocated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.order.clear();
        self.bytes_allocated = 0;
    }

    /// Records in ascending LBA order.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.order.values().filter_map(|id| self.arena.get(*id))
    }

    /// `(start, end)` of every record, in order.
    #[cfg(test)]
    pub fn ranges(&self) -> Vec<(u64, u64)> {
        self.records().map(|r| (r.start, r.end())).collect()
    }

    /// Store `bytes` over `[lba, lba + blocks)`.
    ///
    /// `bytes` holds `blocks` blocks in stored form: raw for plain block
    /// sizes, codec units for compressed block sizes.
    pub fn write(
        &mut self,
        lba: u64,
        blocks: u64,
        block_size: u32,
        bytes: &[u8],
    ) -> Result<(), JournalError> {
        if block_size == 0 {
            return Err(JournalError::InvalidBlockSize(block_size));
        }
        let end = range_end(lba, blocks)?;
        let expected = (blocks as usize)
            .checked_mul(stored_block_len(block_size))
            .ok_or(JournalError::OutOfMemory { bytes: usize::MAX })?;
        if bytes.len() != expected {
            return Err(JournalError::BadLength {
                expected,
                actual: bytes.len(),
            });
        }
        if blocks == 0 {
            return Ok(());
        }

        if self.verify && is_compressed_block_size(block_size) {
            if let Err(e) = codec::verify_buffer(bytes) {
                warn!(lba, blocks, block_size, error = %e, "compressed write failed verification");
            }
        }

        self.apply(lba, end, Incoming::Data { block_size, bytes })
    }

    /// Store one stored-form block repeated over `[lba, lba + blocks)`.
    ///
    /// Only the single block is kept; it merges with neighbours repeating
    /// the same block.
    pub fn write_repeated(
        &mut self,
        lba: u64,
        blocks: u64,
        block_size: u32,
        block: &[u8],
    ) -> Result<(), JournalError> {
        if block_size == 0 {
            return Err(JournalError::InvalidBlockSize(block_size));
        }
        let end = range_end(lba, blocks)?;
        let expected = stored_block_len(block_size);
        if block.len() != expected {
            return Err(JournalError::BadLength {
                expected,
                actual: block.len(),
            });
        }
        if blocks == 0 {
            return Ok(());
        }

        if self.verify && is_compressed_block_size(block_size) {
            if let Err(e) = codec::verify_buffer(block) {
                warn!(lba, blocks, block_size, error = %e, "compressed write failed verification");
            }
        }

        self.apply(lba, end, Incoming::Repeat { block_size, block })
    }

    /// Mark `[lba, lba + blocks)` as zeroed.
    pub fn write_zero_pattern(
        &mut self,
        lba: u64,
        blocks: u64,
        block_size: u32,
        key: Option<&EncryptionKey>,
        unmapped: bool,
    ) -> Result<(), JournalError> {
        if block_size == 0 {
            return Err(JournalError::InvalidBlockSize(block_size));
        }
        let end = range_end(lba, blocks)?;
        if blocks == 0 {
            return Ok(());
        }
        self.apply(lba, end, Incoming::Zero { key, unmapped })
    }

    fn apply(&mut self, lba: u64, end: u64, incoming: Incoming<'_>) -> Result<(), JournalError> {
        let touched = self.touched(lba, end, &incoming);

        let mut overlapping = touched.iter().filter(|t| t.overlaps);
        if let (Some(only), None) = (overlapping.next(), overlapping.next()) {
            if only.compatible && only.start <= lba && only.end >= end {
                self.patch_in_place(only.id, lba, incoming);
                return Ok(());
            }
        }

        // Widen over every compatible record the range touches
        let (start, last) = touched
            .iter()
            .filter(|t| t.compatible)
            .fold((lba, end), |(s, e), t| (s.min(t.start), e.max(t.end)));

        let kind = match incoming {
            Incoming::Data { block_size, bytes } => {
                let stored = stored_block_len(block_size);
                let mut buf = alloc_zeroed((last - start) as usize * stored)?;
                for t in touched.iter().filter(|t| t.compatible) {
                    if let Some(Record {
                        kind: RecordKind::Data { bytes: old, .. },
                        ..
                    }) = self.arena.get(t.id)
                    {
                        let offset = (t.start - start) as usize * stored;
                        buf[offset..offset + old.len()].copy_from_slice(old);
                    }
                }
                let offset = (lba - start) as usize * stored;
                buf[offset..offset + bytes.len()].copy_from_slice(bytes);
                RecordKind::Data {
                    block_size,
                    compressed: is_compressed_block_size(block_size),
                    bytes: buf,
                }
            }
            Incoming::Repeat { block_size, block } => {
                let mut buf = alloc(block.len())?;
                buf.extend_from_slice(block);
                RecordKind::Repeat {
                    block_size,
                    compressed: is_compressed_block_size(block_size),
                    block: buf,
                }
            }
            Incoming::Zero { key, unmapped } => RecordKind::Zero {
                key: key.cloned(),
                unmapped,
            },
        };

        // Keep the untouched edges of incompatible records
        let mut remnants = Vec::new();
        for t in touched.iter().filter(|t| t.overlaps && !t.compatible) {
            let Some(record) = self.arena.get(t.id) else {
                continue;
            };
            if t.start < lba {
                remnants.push(slice_record(record, t.start, lba)?);
            }
            if t.end > end {
                remnants.push(slice_record(record, end, t.end)?);
            }
        }
        if self.arena.try_reserve(remnants.len() + 1).is_err() {
            tracing::error!(records = remnants.len() + 1, "journal record allocation failed");
            return Err(JournalError::OutOfMemory {
                bytes: (remnants.len() + 1) * std::mem::size_of::<Record>(),
            });
        }

        for t in touched.iter().filter(|t| t.overlaps || t.compatible) {
            self.remove(t.id);
        }
        for remnant in remnants {
            self.insert(remnant);
        }
        self.insert(Record {
            start,
            blocks: last - start,
            kind,
        });
        Ok(())
    }

    /// The new range lies inside one compatible record.
    fn patch_in_place(&mut self, id: RecordId, lba: u64, incoming: Incoming<'_>) {
        let Incoming::Data { block_size, bytes } = incoming else {
            // Same repeated block, or same key and unmapped state
            return;
        };
        if let Some(record) = self.arena.get_mut(id) {
            let offset = (lba - record.start) as usize * stored_block_len(block_size);
            if let RecordKind::Data { bytes: old, .. } = &mut record.kind {
                old[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
        }
    }

    /// Records overlapping or adjacent to `[lba, end)`, ascending.
    fn touched(&self, lba: u64, end: u64, incoming: &Incoming<'_>) -> Vec<Touched> {
        let mut found = Vec::new();
        for id in self.order.range(..=end).rev().map(|(_, id)| *id) {
            let Some(record) = self.arena.get(id) else {
                continue;
            };
            if record.end() < lba {
                break;
            }
            found.push(Touched {
                id,
                start: record.start,
                end: record.end(),
                compatible: incoming.can_merge(&record.kind),
                overlaps: record.start < end && record.end() > lba,
            });
        }
        found.reverse();
        found
    }

    fn insert(&mut self, record: Record) {
        self.bytes_allocated += record.allocated();
        let start = record.start;
        let id = self.arena.insert(record);
        self.order.insert(start, id);
    }

    fn remove(&mut self, id: RecordId) {
        if let Some(record) = self.arena.remove(id) {
            self.bytes_allocated -= record.allocated();
            self.order.remove(&record.start);
        }
    }
}

/// End of `[lba, lba + blocks)`, rejecting address overflow.
pub(super) fn range_end(lba: u64, blocks: u64) -> Result<u64, JournalError> {
    lba.checked_add(blocks).ok_or(JournalError::OutOfRange {
        lba,
        blocks,
        capacity: u64::MAX,
    })
}

/// Copy `[from, to)` of a record into a new record.
fn slice_record(record: &Record, from: u64, to: u64) -> Result<Record, JournalError> {
    let kind = match &record.kind {
        RecordKind::Data {
            block_size,
            compressed,
            bytes,
        } => {
            let stored = stored_block_len(*block_size);
            let offset = (from - record.start) as usize * stored;
            let len = (to - from) as usize * stored;
            let mut buf = alloc(len)?;
            buf.extend_from_slice(&bytes[offset..offset + len]);
            RecordKind::Data {
                block_size: *block_size,
                compressed: *compressed,
                bytes: buf,
            }
        }
        RecordKind::Repeat {
            block_size,
            compressed,
            block,
        } => {
            let mut buf = alloc(block.len())?;
            buf.extend_from_slice(block);
            RecordKind::Repeat {
                block_size: *block_size,
                compressed: *compressed,
                block: buf,
            }
        }
        zero @ RecordKind::Zero { .. } => zero.clone(),
    };
    Ok(Record {
        start: from,
        blocks: to - from,
        kind,
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
