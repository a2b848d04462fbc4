// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read reconstruction

use tracing::{error, warn};

use super::store::{range_end, Journal};
use super::{alloc, alloc_zeroed, JournalError, Record, RecordKind};
use crate::codec::{self, is_compressed_block_size, stored_block_len};
use crate::pattern::{apply_key, fill_bootstrap_block, fill_zero_block, DriveLocation};
use crate::policy::{FillPolicy, UnwrittenRead};

/// Bytes returned by a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub data: Vec<u8>,
    /// Some block came from an unmapped zero record
    pub unmapped: bool,
    /// `data` holds codec units instead of logical blocks
    pub compressed: bool,
}

impl Journal {
    /// Reconstruct `[lba, lba + blocks)` at `block_size`.
    pub fn read(
        &self,
        lba: u64,
        blocks: u64,
        block_size: u32,
        location: DriveLocation,
        policy: &FillPolicy,
    ) -> Result<ReadOutcome, JournalError> {
        if block_size == 0 {
            return Err(JournalError::InvalidBlockSize(block_size));
        }
        let end = range_end(lba, blocks)?;
        if let Some(outcome) = self.pass_through(lba, end, block_size)? {
            return Ok(outcome);
        }

        let bs = block_size as usize;
        let mut out = Render {
            data: alloc_zeroed(blocks as usize * bs)?,
            lba,
            bs,
            unmapped: false,
            zero_filled: 0,
        };
        let mut cursor = lba;
        for record in self.overlapping(lba, end) {
            let from = record.start.max(lba);
            let to = record.end().min(end);
            out.gap(cursor, from, location, policy)?;
            out.record(record, from, to)?;
            cursor = to;
        }
        out.gap(cursor, end, location, policy)?;

        if out.zero_filled > 0 {
            warn!(
                lba,
                blocks,
                zero_filled = out.zero_filled,
                %location,
                "zero-filled read of unwritten blocks"
            );
        }
        Ok(ReadOutcome {
            data: out.data,
            unmapped: out.unmapped,
            compressed: false,
        })
    }

    /// Records intersecting `[lba, end)`, ascending.
    fn overlapping(&self, lba: u64, end: u64) -> impl Iterator<Item = &Record> + '_ {
        let before = self.order.range(..lba).next_back().map(|(_, id)| *id);
        before
            .into_iter()
            .chain(self.order.range(lba..end).map(|(_, id)| *id))
            .filter_map(move |id| self.arena.get(id))
            .filter(move |r| r.end() > lba && r.start < end)
    }

    /// Raw codec units, when compressed records of exactly this block size
    /// cover the whole range without gaps.
    fn pass_through(
        &self,
        lba: u64,
        end: u64,
        block_size: u32,
    ) -> Result<Option<ReadOutcome>, JournalError> {
        if !is_compressed_block_size(block_size) || lba == end {
            return Ok(None);
        }
        let mut cursor = lba;
        for record in self.overlapping(lba, end) {
            let same_size = matches!(
                record.kind,
                RecordKind::Data { block_size: b, compressed: true, .. } if b == block_size
            );
            if record.start > cursor || !same_size {
                return Ok(None);
            }
            cursor = record.end().min(end);
        }
        if cursor != end {
            return Ok(None);
        }

        let stored = stored_block_len(block_size);
        let mut data = alloc((end - lba) as usize * stored)?;
        for record in self.overlapping(lba, end) {
            if let RecordKind::Data { bytes, .. } = &record.kind {
                let from = record.start.max(lba);
                let to = record.end().min(end);
                let offset = (from - record.start) as usize * stored;
                data.extend_from_slice(&bytes[offset..offset + (to - from) as usize * stored]);
            }
        }
        Ok(Some(ReadOutcome {
            data,
            unmapped: false,
            compressed: true,
        }))
    }
}

/// Output buffer under construction
struct Render {
    data: Vec<u8>,
    lba: u64,
    bs: usize,
    unmapped: bool,
    zero_filled: u64,
}

impl Render {
    fn block(&mut self, lba: u64) -> &mut [u8] {
        let offset = (lba - self.lba) as usize * self.bs;
        &mut self.data[offset..offset + self.bs]
    }

    fn blocks(&mut self, from: u64, to: u64) -> &mut [u8] {
        let offset = (from - self.lba) as usize * self.bs;
        &mut self.data[offset..offset + (to - from) as usize * self.bs]
    }

    /// Fill LBAs no record covers.
    fn gap(
        &mut self,
        from: u64,
        to: u64,
        location: DriveLocation,
        policy: &FillPolicy,
    ) -> Result<(), JournalError> {
        for lba in from..to {
            if policy.bootstrap.covers(location, lba) {
                fill_bootstrap_block(self.block(lba), location, lba);
                continue;
            }
            match policy.unwritten {
                UnwrittenRead::Error => {
                    error!(lba, %location, "read of unwritten user data");
                    return Err(JournalError::UnwrittenRead { lba });
                }
                UnwrittenRead::ZeroFill => {
                    fill_zero_block(self.block(lba), false);
                    self.zero_filled += 1;
                }
            }
        }
        Ok(())
    }

    fn record(&mut self, record: &Record, from: u64, to: u64) -> Result<(), JournalError> {
        match &record.kind {
            RecordKind::Zero { key, unmapped } => {
                self.unmapped |= *unmapped;
                for lba in from..to {
                    let block = self.block(lba);
                    fill_zero_block(block, *unmapped);
                    if let Some(key) = key {
                        apply_key(block, key);
                    }
                }
            }
            RecordKind::Repeat {
                block_size,
                compressed,
                block,
            } => {
                let decoded;
                let logical: &[u8] = if *compressed {
                    let mut buf = alloc_zeroed(*block_size as usize)?;
                    if let Err(e) = codec::decode_buffer(block, &mut buf) {
                        warn!(lba = from, error = %e, "repeated block failed to decode");
                    }
                    decoded = buf;
                    &decoded
                } else {
                    block
                };
                for lba in from..to {
                    let out = self.block(lba);
                    let n = out.len().min(logical.len());
                    out[..n].copy_from_slice(&logical[..n]);
                }
            }
            RecordKind::Data {
                block_size,
                compressed,
                bytes,
            } => {
                let stored = stored_block_len(*block_size);
                let source = move |lba: u64| {
                    let offset = (lba - record.start) as usize * stored;
                    &bytes[offset..offset + stored]
                };
                if *block_size as usize == self.bs {
                    let offset = (from - record.start) as usize * stored;
                    let raw = &bytes[offset..offset + (to - from) as usize * stored];
                    let out = self.blocks(from, to);
                    if *compressed {
                        if let Err(e) = codec::decode_buffer(raw, out) {
                            warn!(lba = from, error = %e, "compressed record failed to decode");
                        }
                    } else {
                        out.copy_from_slice(raw);
                    }
                    return Ok(());
                }

                // Block size differs from the caller's: copy what overlaps
                let mut logical = if *compressed {
                    alloc_zeroed(*block_size as usize)?
                } else {
                    Vec::new()
                };
                for lba in from..to {
                    let block_bytes: &[u8] = if *compressed {
                        if let Err(e) = codec::decode_buffer(source(lba), &mut logical) {
                            warn!(lba, error = %e, "compressed record failed to decode");
                        }
                        &logical
                    } else {
                        source(lba)
                    };
                    let block = self.block(lba);
                    let n = block.len().min(block_bytes.len());
                    block[..n].copy_from_slice(&block_bytes[..n]);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "read_tests.rs"]
mod tests;
