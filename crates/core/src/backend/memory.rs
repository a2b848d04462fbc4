// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives held in this process's own registry

use std::sync::Arc;

use async_trait::async_trait;

use super::{BackendError, BlockIo, DriveBackend, ZeroOptions};
use crate::disk::{DiskSpec, DriveIdentity, DriveInfo};
use crate::journal::ReadOutcome;
use crate::policy::FillPolicy;
use crate::registry::{DriveHandle, Registry, Side};

/// Backend over a local [`Registry`]
#[derive(Clone)]
pub struct InMemoryBackend {
    registry: Arc<Registry>,
    side: Side,
    policy: FillPolicy,
}

impl InMemoryBackend {
    pub fn new(registry: Arc<Registry>, side: Side, policy: FillPolicy) -> Self {
        Self {
            registry,
            side,
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[async_trait]
impl DriveBackend for InMemoryBackend {
    async fn create(
        &self,
        identity: &DriveIdentity,
        spec: DiskSpec,
    ) -> Result<DriveHandle, BackendError> {
        let (handle, _) = self.registry.create(identity.clone(), spec, self.side)?;
        Ok(handle)
    }

    async fn open(&self, identity: &DriveIdentity) -> Result<DriveHandle, BackendError> {
        let (handle, _) = self.registry.open(identity, self.side)?;
        Ok(handle)
    }

    async fn remove(&self, identity: &DriveIdentity) -> Result<(), BackendError> {
        self.registry.remove(identity, self.side)?;
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), BackendError> {
        self.registry.remove_all();
        Ok(())
    }

    async fn read(&self, handle: DriveHandle, io: BlockIo) -> Result<ReadOutcome, BackendError> {
        let disk = self.registry.get(handle)?;
        Ok(disk.read(io.lba, io.blocks, io.block_size, &self.policy)?)
    }

    async fn write(
        &self,
        handle: DriveHandle,
        io: BlockIo,
        data: Vec<u8>,
    ) -> Result<(), BackendError> {
        let disk = self.registry.get(handle)?;
        Ok(disk.write(io.lba, io.blocks, io.block_size, &data)?)
    }

    async fn write_same(
        &self,
        handle: DriveHandle,
        io: BlockIo,
        pattern: Vec<u8>,
        zero: ZeroOptions,
    ) -> Result<(), BackendError> {
        let disk = self.registry.get(handle)?;
        Ok(disk.write_same(
            io.lba,
            io.blocks,
            io.block_size,
            &pattern,
            zero.key.as_ref(),
            zero.unmapped,
        )?)
    }

    async fn drive_info(&self, handle: DriveHandle) -> Result<DriveInfo, BackendError> {
        Ok(self.registry.get(handle)?.info())
    }

    async fn set_debug_flags(&self, handle: DriveHandle, flags: u32) -> Result<(), BackendError> {
        self.registry.get(handle)?.set_debug_flags(flags);
        Ok(())
    }

    async fn server_pid(&self) -> Result<u32, BackendError> {
        Ok(std::process::id())
    }

    async fn file_size(&self, _identity: &DriveIdentity) -> Result<u64, BackendError> {
        Err(BackendError::NotSupported("file size"))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
