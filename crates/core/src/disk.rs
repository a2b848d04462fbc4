// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Virtual disk: identity, geometry and a lock-serialized journal

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::codec::{self, is_compressed_block_size, stored_block_len};
use crate::journal::{alloc, alloc_zeroed, Journal, JournalError, JournalStats, ReadOutcome};
use crate::pattern::{payload_is_zero, DriveLocation, EncryptionKey};
use crate::policy::FillPolicy;

/// Longest identity the wire record can carry.
pub const IDENTITY_MAX: usize = 32;

/// Write-same repeat count from which only one block is stored.
pub const REPEAT_THRESHOLD: u64 = 16;

/// Request tracing bits, set per disk
pub mod debug_flags {
    pub const TRACE_READS: u32 = 0x1;
    pub const TRACE_WRITES: u32 = 0x2;
    pub const TRACE_ZEROS: u32 = 0x4;
    /// System drives are only traced with this bit set
    pub const TRACE_SYSTEM_DRIVES: u32 = 0x8;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("drive identity is {0} bytes, limit is {IDENTITY_MAX}")]
pub struct IdentityError(pub usize);

/// Opaque drive identity, such as a serial number
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriveIdentity(Vec<u8>);

impl DriveIdentity {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, IdentityError> {
        let bytes = bytes.into();
        if bytes.is_empty() || bytes.len() > IDENTITY_MAX {
            return Err(IdentityError(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DriveIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for DriveIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DriveIdentity({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Geometry and position of a disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub block_size: u32,
    /// Addressable blocks (max LBA + 1)
    pub capacity: u64,
    #[serde(default)]
    pub location: DriveLocation,
}

/// Diagnostic snapshot of a disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveInfo {
    pub records: u64,
    pub bytes_allocated: u64,
    pub block_size: u32,
    pub capacity: u64,
}

/// One virtual disk
#[derive(Debug)]
pub struct VirtualDisk {
    identity: DriveIdentity,
    spec: DiskSpec,
    system_drive: bool,
    debug_flags: AtomicU32,
    journal: Mutex<Journal>,
}

impl VirtualDisk {
    pub fn new(identity: DriveIdentity, spec: DiskSpec, system_drive: bool, verify: bool) -> Self {
        Self {
            identity,
            spec,
            system_drive,
            debug_flags: AtomicU32::new(0),
            journal: Mutex::new(Journal::new(verify)),
        }
    }

    pub fn identity(&self) -> &DriveIdentity {
        &self.identity
    }

    pub fn spec(&self) -> DiskSpec {
        self.spec
    }

    pub fn location(&self) -> DriveLocation {
        self.spec.location
    }

    pub fn debug_flags(&self) -> u32 {
        self.debug_flags.load(Ordering::Relaxed)
    }

    pub fn set_debug_flags(&self, flags: u32) {
        self.debug_flags.store(flags, Ordering::Relaxed);
    }

    fn traced(&self, bit: u32) -> bool {
        let flags = self.debug_flags();
        flags & bit != 0 && (!self.system_drive || flags & debug_flags::TRACE_SYSTEM_DRIVES != 0)
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_range(&self, lba: u64, blocks: u64) -> Result<(), JournalError> {
        match lba.checked_add(blocks) {
            Some(end) if end <= self.spec.capacity => Ok(()),
            _ => Err(JournalError::OutOfRange {
                lba,
                blocks,
                capacity: self.spec.capacity,
            }),
        }
    }

    pub fn write(
        &self,
        lba: u64,
        blocks: u64,
        block_size: u32,
        bytes: &[u8],
    ) -> Result<(), JournalError> {
        self.check_range(lba, blocks)?;
        if self.traced(debug_flags::TRACE_WRITES) {
            info!(disk = %self.identity, lba, blocks, block_size, len = bytes.len(), "write");
        }
        self.journal().write(lba, blocks, block_size, bytes)
    }

    pub fn write_zero_pattern(
        &self,
        lba: u64,
        blocks: u64,
        block_size: u32,
        key: Option<&EncryptionKey>,
        unmapped: bool,
    ) -> Result<(), JournalError> {
        self.check_range(lba, blocks)?;
        if self.traced(debug_flags::TRACE_ZEROS) {
            info!(
                disk = %self.identity,
                lba,
                blocks,
                block_size,
                keyed = key.is_some(),
                unmapped,
                "write zero pattern"
            );
        }
        self.journal()
            .write_zero_pattern(lba, blocks, block_size, key, unmapped)
    }

    /// Write one block `repeat` times starting at `lba`.
    ///
    /// A zero payload (or an unmapped request) is stored as a zero-pattern
    /// record instead of replicated bytes. At [`REPEAT_THRESHOLD`] repeats
    /// and above only the one block is stored.
    pub fn write_same(
        &self,
        lba: u64,
        repeat: u64,
        block_size: u32,
        pattern: &[u8],
        key: Option<&EncryptionKey>,
        unmapped: bool,
    ) -> Result<(), JournalError> {
        if block_size == 0 {
            return Err(JournalError::InvalidBlockSize(block_size));
        }
        let stored = stored_block_len(block_size);
        if pattern.len() != stored {
            return Err(JournalError::BadLength {
                expected: stored,
                actual: pattern.len(),
            });
        }
        if unmapped || is_zero_block(block_size, pattern)? {
            return self.write_zero_pattern(lba, repeat, block_size, key, unmapped);
        }

        self.check_range(lba, repeat)?;
        if repeat >= REPEAT_THRESHOLD {
            if self.traced(debug_flags::TRACE_WRITES) {
                info!(disk = %self.identity, lba, repeat, block_size, "write same");
            }
            return self
                .journal()
                .write_repeated(lba, repeat, block_size, pattern);
        }
        let mut bytes = alloc(stored.saturating_mul(repeat as usize))?;
        for _ in 0..repeat {
            bytes.extend_from_slice(pattern);
        }
        self.write(lba, repeat, block_size, &bytes)
    }

    pub fn read(
        &self,
        lba: u64,
        blocks: u64,
        block_size: u32,
        policy: &FillPolicy,
    ) -> Result<ReadOutcome, JournalError> {
        self.check_range(lba, blocks)?;
        let outcome = self
            .journal()
            .read(lba, blocks, block_size, self.spec.location, policy)?;
        if self.traced(debug_flags::TRACE_READS) {
            info!(
                disk = %self.identity,
                lba,
                blocks,
                block_size,
                unmapped = outcome.unmapped,
                compressed = outcome.compressed,
                "read"
            );
        }
        Ok(outcome)
    }

    pub fn stats(&self) -> JournalStats {
        self.journal().stats()
    }

    pub fn info(&self) -> DriveInfo {
        let stats = self.stats();
        DriveInfo {
            records: stats.records as u64,
            bytes_allocated: stats.bytes_allocated as u64,
            block_size: self.spec.block_size,
            capacity: self.spec.capacity,
        }
    }

    /// Free every record.
    pub fn destroy(&self) {
        let mut journal = self.journal();
        let freed = journal.stats();
        journal.clear();
        info!(disk = %self.identity, records = freed.records, bytes = freed.bytes_allocated, "disk destroyed");
    }
}

/// Whether a stored-form block decodes to an all-zero payload.
fn is_zero_block(block_size: u32, pattern: &[u8]) -> Result<bool, JournalError> {
    if !is_compressed_block_size(block_size) {
        return Ok(payload_is_zero(pattern));
    }
    let mut logical = alloc_zeroed(block_size as usize)?;
    if codec::decode_buffer(pattern, &mut logical).is_err() {
        return Ok(false);
    }
    Ok(payload_is_zero(&logical))
}

#[cfg(test)]
#[path = "disk_tests.rs"]
mod tests;
