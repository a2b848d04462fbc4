// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced backend wrapper for consistent observability

use std::time::Instant;

use async_trait::async_trait;
use tracing::Instrument;

use super::{BackendError, BlockIo, DriveBackend, ZeroOptions};
use crate::disk::{DiskSpec, DriveIdentity, DriveInfo};
use crate::journal::ReadOutcome;
use crate::registry::DriveHandle;

/// Wrapper that adds spans and timing to any DriveBackend
#[derive(Clone)]
pub struct TracedBackend<B> {
    inner: B,
}

impl<B> TracedBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

fn log_result<T>(result: &Result<T, BackendError>, start: Instant, what: &str) {
    let elapsed_us = start.elapsed().as_micros() as u64;
    match result {
        Ok(_) => tracing::debug!(elapsed_us, "{what} done"),
        Err(e) => tracing::warn!(elapsed_us, error = %e, "{what} failed"),
    }
}

#[async_trait]
impl<B: DriveBackend> DriveBackend for TracedBackend<B> {
    async fn create(
        &self,
        identity: &DriveIdentity,
        spec: DiskSpec,
    ) -> Result<DriveHandle, BackendError> {
        let span = tracing::info_span!(
            "drive.create",
            disk = %identity,
            block_size = spec.block_size,
            capacity = spec.capacity
        );
        async {
            let start = Instant::now();
            let result = self.inner.create(identity, spec).await;
            if let Ok(handle) = &result {
                tracing::info!(%handle, "created");
            }
            log_result(&result, start, "create");
            result
        }
        .instrument(span)
        .await
    }

    async fn open(&self, identity: &DriveIdentity) -> Result<DriveHandle, BackendError> {
        let span = tracing::info_span!("drive.open", disk = %identity);
        async {
            let start = Instant::now();
            let result = self.inner.open(identity).await;
            log_result(&result, start, "open");
            result
        }
        .instrument(span)
        .await
    }

    async fn remove(&self, identity: &DriveIdentity) -> Result<(), BackendError> {
        let span = tracing::info_span!("drive.remove", disk = %identity);
        async {
            let result = self.inner.remove(identity).await;
            match &result {
                Ok(()) => tracing::info!("removed"),
                Err(e) => tracing::warn!(error = %e, "remove failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn remove_all(&self) -> Result<(), BackendError> {
        let span = tracing::info_span!("drive.remove_all");
        async {
            let result = self.inner.remove_all().await;
            tracing::info!(ok = result.is_ok(), "remove all");
            result
        }
        .instrument(span)
        .await
    }

    async fn read(&self, handle: DriveHandle, io: BlockIo) -> Result<ReadOutcome, BackendError> {
        let span = tracing::info_span!(
            "drive.read",
            %handle,
            lba = io.lba,
            blocks = io.blocks,
            block_size = io.block_size
        );
        async {
            let start = Instant::now();
            let result = self.inner.read(handle, io).await;
            if let Ok(outcome) = &result {
                tracing::trace!(
                    len = outcome.data.len(),
                    unmapped = outcome.unmapped,
                    compressed = outcome.compressed,
                    "read payload"
                );
            }
            log_result(&result, start, "read");
            result
        }
        .instrument(span)
        .await
    }

    async fn write(
        &self,
        handle: DriveHandle,
        io: BlockIo,
        data: Vec<u8>,
    ) -> Result<(), BackendError> {
        let span = tracing::info_span!(
            "drive.write",
            %handle,
            lba = io.lba,
            blocks = io.blocks,
            block_size = io.block_size,
            len = data.len()
        );
        async {
            let start = Instant::now();
            let result = self.inner.write(handle, io, data).await;
            log_result(&result, start, "write");
            result
        }
        .instrument(span)
        .await
    }

    async fn write_same(
        &self,
        handle: DriveHandle,
        io: BlockIo,
        pattern: Vec<u8>,
        zero: ZeroOptions,
    ) -> Result<(), BackendError> {
        let span = tracing::info_span!(
            "drive.write_same",
            %handle,
            lba = io.lba,
            repeat = io.blocks,
            block_size = io.block_size,
            keyed = zero.key.is_some(),
            unmapped = zero.unmapped
        );
        async {
            let start = Instant::now();
            let result = self.inner.write_same(handle, io, pattern, zero).await;
            log_result(&result, start, "write same");
            result
        }
        .instrument(span)
        .await
    }

    async fn drive_info(&self, handle: DriveHandle) -> Result<DriveInfo, BackendError> {
        let result = self.inner.drive_info(handle).await;
        tracing::trace!(%handle, info = ?result.as_ref().ok(), "drive info");
        result
    }

    async fn set_debug_flags(&self, handle: DriveHandle, flags: u32) -> Result<(), BackendError> {
        tracing::info!(%handle, flags = format_args!("{flags:#x}"), "set debug flags");
        self.inner.set_debug_flags(handle, flags).await
    }

    async fn server_pid(&self) -> Result<u32, BackendError> {
        self.inner.server_pid().await
    }

    async fn file_size(&self, identity: &DriveIdentity) -> Result<u64, BackendError> {
        self.inner.file_size(identity).await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
