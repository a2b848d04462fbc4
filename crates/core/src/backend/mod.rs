// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drive backends
//!
//! Everything above the journal talks to drives through [`DriveBackend`].
//! The in-memory backend drives a local registry, the file backend keeps one
//! sparse file per drive, and the remote backend (in the client crate)
//! forwards every call to a daemon.

mod file;
mod memory;
mod traced;

pub use file::LocalFileBackend;
pub use memory::InMemoryBackend;
pub use traced::TracedBackend;

use async_trait::async_trait;
use thiserror::Error;

use crate::disk::{DiskSpec, DriveIdentity, DriveInfo};
use crate::journal::{JournalError, ReadOutcome};
use crate::pattern::EncryptionKey;
use crate::registry::{DriveHandle, RegistryError};

/// Errors from backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not supported by this backend")]
    NotSupported(&'static str),

    #[error("request failed with status {status}")]
    Remote { status: i64 },

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Block range of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIo {
    pub lba: u64,
    /// Blocks transferred, or the repeat count of a write-same
    pub blocks: u64,
    pub block_size: u32,
}

impl BlockIo {
    pub fn new(lba: u64, blocks: u64, block_size: u32) -> Self {
        Self {
            lba,
            blocks,
            block_size,
        }
    }

    /// First LBA past the range.
    pub fn end(&self) -> u64 {
        self.lba.saturating_add(self.blocks)
    }

    pub fn overlaps(&self, other: &BlockIo) -> bool {
        self.lba < other.end() && other.lba < self.end()
    }
}

/// Zero handling options of a write-same
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZeroOptions {
    pub key: Option<EncryptionKey>,
    pub unmapped: bool,
}

/// Block storage for virtual drives
#[async_trait]
pub trait DriveBackend: Send + Sync + 'static {
    /// Create a drive, discarding prior data under the same identity.
    async fn create(
        &self,
        identity: &DriveIdentity,
        spec: DiskSpec,
    ) -> Result<DriveHandle, BackendError>;

    async fn open(&self, identity: &DriveIdentity) -> Result<DriveHandle, BackendError>;

    async fn remove(&self, identity: &DriveIdentity) -> Result<(), BackendError>;

    async fn remove_all(&self) -> Result<(), BackendError>;

    async fn read(&self, handle: DriveHandle, io: BlockIo) -> Result<ReadOutcome, BackendError>;

    async fn write(
        &self,
        handle: DriveHandle,
        io: BlockIo,
        data: Vec<u8>,
    ) -> Result<(), BackendError>;

    /// Write one block `io.blocks` times.
    async fn write_same(
        &self,
        handle: DriveHandle,
        io: BlockIo,
        pattern: Vec<u8>,
        zero: ZeroOptions,
    ) -> Result<(), BackendError>;

    async fn drive_info(&self, handle: DriveHandle) -> Result<DriveInfo, BackendError>;

    async fn set_debug_flags(&self, handle: DriveHandle, flags: u32) -> Result<(), BackendError>;

    /// Process id of whatever serves the drives.
    async fn server_pid(&self) -> Result<u32, BackendError>;

    /// Size of the drive's backing file.
    async fn file_size(&self, identity: &DriveIdentity) -> Result<u64, BackendError>;
}
