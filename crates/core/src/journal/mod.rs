// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journal record store
//!
//! Each virtual disk keeps its written ranges as an ordered, non-overlapping
//! set of records. A record either owns the bytes of a contiguous LBA range or
//! describes a zeroed range without storing any bytes. Writes coalesce with
//! compatible neighbours and split incompatible ones; reads stitch the records
//! back together and synthesize whatever is not covered.

mod arena;
mod read;
mod store;

pub use arena::{Arena, RecordId};
pub use read::ReadOutcome;
pub use store::{Journal, JournalStats};

use thiserror::Error;

use crate::codec::CodecError;
use crate::pattern::{EncryptionKey, KeyLengthError};

/// Errors from journal operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JournalError {
    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("payload is {actual} bytes, expected {expected}")]
    BadLength { expected: usize, actual: usize },

    #[error("lba {lba} + {blocks} blocks exceeds capacity {capacity}")]
    OutOfRange { lba: u64, blocks: u64, capacity: u64 },

    #[error("read of unwritten lba {lba}")]
    UnwrittenRead { lba: u64 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("invalid block size {0}")]
    InvalidBlockSize(u32),

    #[error(transparent)]
    InvalidKey(#[from] KeyLengthError),
}

/// One contiguous span of a disk's address space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub start: u64,
    pub blocks: u64,
    pub kind: RecordKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// Owned bytes, `blocks × stored_block_len(block_size)` long
    Data {
        block_size: u32,
        compressed: bool,
        bytes: Vec<u8>,
    },
    /// One stored block repeated over the whole range
    Repeat {
        block_size: u32,
        compressed: bool,
        block: Vec<u8>,
    },
    /// Zeroed range; rendered on read
    Zero {
        key: Option<EncryptionKey>,
        unmapped: bool,
    },
}

impl Record {
    /// First LBA past the record.
    pub fn end(&self) -> u64 {
        self.start + self.blocks
    }

    pub fn is_zero(&self) -> bool {
        matches!(self.kind, RecordKind::Zero { .. })
    }

    /// Bytes owned by this record.
    pub fn allocated(&self) -> usize {
        match &self.kind {
            RecordKind::Data { bytes, .. } => bytes.len(),
            RecordKind::Repeat { block, .. } => block.len(),
            RecordKind::Zero { .. } => 0,
        }
    }
}

/// Allocate an empty buffer with room for exactly `len` bytes.
pub(crate) fn alloc(len: usize) -> Result<Vec<u8>, JournalError> {
    let mut buf = Vec::new();
    if buf.try_reserve_exact(len).is_err() {
        tracing::error!(bytes = len, "journal buffer allocation failed");
        return Err(JournalError::OutOfMemory { bytes: len });
    }
    Ok(buf)
}

/// Allocate a zeroed buffer of `len` bytes.
pub(crate) fn alloc_zeroed(len: usize) -> Result<Vec<u8>, JournalError> {
    let mut buf = alloc(len)?;
    buf.resize(len, 0);
    Ok(buf)
}
