// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives served by a daemon

use std::net::SocketAddr;

use async_trait::async_trait;
use vdisk_core::{
    BackendError, BlockIo, DiskSpec, DriveBackend, DriveHandle, DriveIdentity, DriveInfo,
    ReadOutcome, ZeroOptions,
};
use vdisk_daemon::protocol::{RequestKind, Status, WireRecord};

use crate::config::ClientConfig;
use crate::connection::{ClientError, Completion, Connection};

impl From<ClientError> for BackendError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Rejected {
                status: Status::NotSupported,
                ..
            } => BackendError::NotSupported("daemon request"),
            ClientError::Rejected { code, .. } => BackendError::Remote { status: code },
            other => BackendError::Transport(other.to_string()),
        }
    }
}

/// Backend forwarding every call to a daemon
pub struct RemoteBackend {
    connection: Connection,
}

impl RemoteBackend {
    pub async fn connect(addr: SocketAddr, config: ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::new(Connection::connect(addr, config).await?))
    }

    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn handle_request(&self, record: WireRecord) -> Result<DriveHandle, BackendError> {
        let completion = self.connection.request(record, None).await?;
        handle_of(&completion)
    }

    fn io_record(kind: RequestKind, handle: DriveHandle, io: BlockIo) -> WireRecord {
        let mut record = WireRecord::new(kind);
        record.handle = handle.to_raw();
        record.lba = io.lba;
        record.block_size = io.block_size;
        record
    }
}

fn identity_record(kind: RequestKind, identity: &DriveIdentity) -> WireRecord {
    let mut record = WireRecord::new(kind);
    record.identity = identity.as_bytes().to_vec();
    record
}

fn handle_of(completion: &Completion) -> Result<DriveHandle, BackendError> {
    DriveHandle::from_raw(completion.record.handle)
        .ok_or_else(|| ClientError::UnexpectedResponse.into())
}

#[async_trait]
impl DriveBackend for RemoteBackend {
    async fn create(
        &self,
        identity: &DriveIdentity,
        spec: DiskSpec,
    ) -> Result<DriveHandle, BackendError> {
        let mut record = identity_record(RequestKind::Create, identity);
        record.block_size = spec.block_size;
        record.requested_capacity = spec.capacity;
        record.location = spec.location;
        self.handle_request(record).await
    }

    async fn open(&self, identity: &DriveIdentity) -> Result<DriveHandle, BackendError> {
        self.handle_request(identity_record(RequestKind::Open, identity))
            .await
    }

    async fn remove(&self, identity: &DriveIdentity) -> Result<(), BackendError> {
        self.connection
            .request(identity_record(RequestKind::Remove, identity), None)
            .await?;
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), BackendError> {
        self.connection
            .request(WireRecord::new(RequestKind::RemoveAll), None)
            .await?;
        Ok(())
    }

    async fn read(&self, handle: DriveHandle, io: BlockIo) -> Result<ReadOutcome, BackendError> {
        let mut record = Self::io_record(RequestKind::Read, handle, io);
        record.byte_length = io.blocks.saturating_mul(u64::from(io.block_size));
        let completion = self.connection.request(record, None).await?;
        Ok(ReadOutcome {
            unmapped: completion.record.unmapped(),
            compressed: completion.record.compressed(),
            data: completion.data,
        })
    }

    async fn write(
        &self,
        handle: DriveHandle,
        io: BlockIo,
        data: Vec<u8>,
    ) -> Result<(), BackendError> {
        let record = Self::io_record(RequestKind::Write, handle, io);
        self.connection.request(record, Some(&data)).await?;
        Ok(())
    }

    async fn write_same(
        &self,
        handle: DriveHandle,
        io: BlockIo,
        pattern: Vec<u8>,
        zero: ZeroOptions,
    ) -> Result<(), BackendError> {
        let mut record = Self::io_record(RequestKind::WriteSame, handle, io);
        record.repeat_count = io.blocks;
        record.key = zero.key.map(|key| key.as_bytes().to_vec());
        record.set_flag(vdisk_daemon::protocol::flags::UNMAPPED, zero.unmapped);
        self.connection.request(record, Some(&pattern)).await?;
        Ok(())
    }

    async fn drive_info(&self, handle: DriveHandle) -> Result<DriveInfo, BackendError> {
        let mut record = WireRecord::new(RequestKind::GetDriveInfo);
        record.handle = handle.to_raw();
        let reply = self.connection.request(record, None).await?.record;
        Ok(DriveInfo {
            records: reply.repeat_count,
            bytes_allocated: reply.return_size,
            block_size: reply.block_size,
            capacity: reply.requested_capacity,
        })
    }

    async fn set_debug_flags(&self, handle: DriveHandle, flags: u32) -> Result<(), BackendError> {
        let mut record = WireRecord::new(RequestKind::SetDebugFlags);
        record.handle = handle.to_raw();
        record.debug_flags = flags;
        self.connection.request(record, None).await?;
        Ok(())
    }

    async fn server_pid(&self) -> Result<u32, BackendError> {
        let reply = self
            .connection
            .request(WireRecord::new(RequestKind::GetServerPid), None)
            .await?
            .record;
        u32::try_from(reply.return_size).map_err(|_| ClientError::UnexpectedResponse.into())
    }

    async fn file_size(&self, identity: &DriveIdentity) -> Result<u64, BackendError> {
        let reply = self
            .connection
            .request(identity_record(RequestKind::GetFileSize, identity), None)
            .await?
            .record;
        Ok(reply.return_size)
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
