// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sector patterns synthesized on read
//!
//! Blocks whose size is a multiple of [`SECTOR_SIZE`] are made of 520-byte
//! sectors: 512 payload bytes followed by 8 bytes of metadata. Other block
//! sizes have no metadata and are rendered as plain bytes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sector size including metadata.
pub const SECTOR_SIZE: usize = 520;

/// Payload bytes per sector.
pub const SECTOR_PAYLOAD: usize = 512;

/// Metadata bytes per sector.
pub const METADATA_SIZE: usize = SECTOR_SIZE - SECTOR_PAYLOAD;

/// Metadata of a valid zeroed sector: checksum 0x5EED with the zero marker.
pub const ZERO_METADATA: u64 = 0x7FFF_5EED;

/// Encryption key length bounds in bytes.
pub const MIN_KEY_LEN: usize = 16;
pub const MAX_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("encryption key must be {MIN_KEY_LEN}..={MAX_KEY_LEN} bytes, got {0}")]
pub struct KeyLengthError(pub usize);

/// Key attached to zero-pattern records to simulate encrypted zeroes
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EncryptionKey(Vec<u8>);

impl EncryptionKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, KeyLengthError> {
        let bytes = bytes.into();
        if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&bytes.len()) {
            return Err(KeyLengthError(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// Key bytes stay out of logs
impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey({} bytes)", self.0.len())
    }
}

/// Physical position of a drive (bus, enclosure, slot)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriveLocation {
    pub bus: u16,
    pub enclosure: u16,
    pub slot: u16,
}

impl DriveLocation {
    pub fn new(bus: u16, enclosure: u16, slot: u16) -> Self {
        Self {
            bus,
            enclosure,
            slot,
        }
    }
}

impl fmt::Display for DriveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.bus, self.enclosure, self.slot)
    }
}

/// Whether blocks of this size carry per-sector metadata.
pub fn has_metadata(block_size: usize) -> bool {
    block_size != 0 && block_size % SECTOR_SIZE == 0
}

/// Render one zeroed block. Unmapped blocks carry no metadata checksum.
pub fn fill_zero_block(block: &mut [u8], unmapped: bool) {
    block.fill(0);
    if unmapped || !has_metadata(block.len()) {
        return;
    }
    for sector in block.chunks_exact_mut(SECTOR_SIZE) {
        sector[SECTOR_PAYLOAD..].copy_from_slice(&ZERO_METADATA.to_le_bytes());
    }
}

/// XOR payload bytes with the key and complement metadata bytes.
///
/// The transform is its own inverse.
pub fn apply_key(block: &mut [u8], key: &EncryptionKey) {
    let key = key.as_bytes();
    if !has_metadata(block.len()) {
        for (i, byte) in block.iter_mut().enumerate() {
            *byte ^= key[i % key.len()];
        }
        return;
    }
    for sector in block.chunks_exact_mut(SECTOR_SIZE) {
        let (payload, metadata) = sector.split_at_mut(SECTOR_PAYLOAD);
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % key.len()];
        }
        for byte in metadata.iter_mut() {
            *byte = !*byte;
        }
    }
}

/// Filler word for a bootstrap read at `lba`.
pub fn bootstrap_word(location: DriveLocation, lba: u64) -> u64 {
    (location.bus as u64) << 56
        | (location.enclosure as u64) << 48
        | (location.slot as u64) << 40
        | (lba & 0xFF_FFFF_FFFF)
}

/// Render the deterministic filler for a never-written bootstrap block.
pub fn fill_bootstrap_block(block: &mut [u8], location: DriveLocation, lba: u64) {
    let word = bootstrap_word(location, lba).to_le_bytes();
    let fill = |bytes: &mut [u8]| {
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = word[i % word.len()];
        }
    };
    if !has_metadata(block.len()) {
        fill(block);
        return;
    }
    for sector in block.chunks_exact_mut(SECTOR_SIZE) {
        let (payload, metadata) = sector.split_at_mut(SECTOR_PAYLOAD);
        fill(payload);
        metadata.copy_from_slice(&ZERO_METADATA.to_le_bytes());
    }
}

/// Whether every payload byte of the block is zero (metadata ignored).
pub fn payload_is_zero(block: &[u8]) -> bool {
    if !has_metadata(block.len()) {
        return block.iter().all(|&b| b == 0);
    }
    block
        .chunks_exact(SECTOR_SIZE)
        .all(|sector| sector[..SECTOR_PAYLOAD].iter().all(|&b| b == 0))
}

#[cfg(test)]
#[path = "pattern_tests.rs"]
mod tests;
