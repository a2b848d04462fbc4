// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch and per-connection handling.
//!
//! Each connection task reads one fixed record at a time, pulls the request
//! payload off the socket before anything is validated, and answers in wire
//! order. Journal operations run inline on the task while the request is
//! registered in the outstanding table.
//!
//! `GET_DRIVE_INFO` reuses record fields: `repeat_count` = records,
//! `return_size` = bytes allocated, `block_size` and `requested_capacity` =
//! the drive's geometry.

use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use vdisk_core::codec::stored_block_len;
use vdisk_core::{
    BlockIo, DiskSpec, DriveIdentity, EncryptionKey, FillPolicy, Registry, RegistryError, Side,
    VirtualDisk,
};

use crate::collision::{InFlightGuard, IoRequest, OutstandingTable};
use crate::config::Config;
use crate::protocol::{
    self, flags, ProtocolError, RequestKind, Status, WireRecord, INVALID_HANDLE,
};
use crate::worker::{CompletedIo, IoStats};

/// Connection-level facts stamped on every response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub side: Side,
    pub transfer_id: u64,
}

/// A response plus whatever must outlive sending it
struct Reply {
    record: WireRecord,
    data: Option<Vec<u8>>,
    guard: Option<InFlightGuard>,
}

impl Reply {
    fn status(request: &WireRecord, status: Status) -> Self {
        let mut record = request.reply(status);
        record.key = None;
        Self {
            record,
            data: None,
            guard: None,
        }
    }

    fn ok(request: &WireRecord) -> Self {
        Self::status(request, Status::Ok)
    }

    /// Reply to a request that could not be taken apart. Flagged as a
    /// collision so the sender treats it as a protocol error.
    fn rejected(request: &WireRecord, status: Status) -> Self {
        let mut reply = Self::status(request, status);
        reply.record.collision_count = 1;
        reply
    }
}

/// Shared server state handed to every connection task
pub struct Dispatcher {
    registry: Arc<Registry>,
    outstanding: Arc<OutstandingTable>,
    completions: mpsc::Sender<CompletedIo>,
    stats: Arc<Mutex<IoStats>>,
    policy: FillPolicy,
    config: Config,
}

impl Dispatcher {
    pub fn new(
        config: Config,
        completions: mpsc::Sender<CompletedIo>,
        stats: Arc<Mutex<IoStats>>,
    ) -> Self {
        Self {
            registry: Arc::new(Registry::new(config.registry_options())),
            outstanding: Arc::new(OutstandingTable::new()),
            completions,
            stats,
            policy: config.fill_policy(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn outstanding(&self) -> &Arc<OutstandingTable> {
        &self.outstanding
    }

    pub fn stats(&self) -> IoStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer one request.
    async fn dispatch(
        &self,
        conn: ConnectionInfo,
        request: &WireRecord,
        payload: Vec<u8>,
    ) -> Reply {
        match request.kind {
            RequestKind::Init => {
                let mut reply = Reply::ok(request);
                reply.record.side = conn.side.index();
                reply.record.transfer_id = conn.transfer_id;
                reply.record.return_size = self.config.max_transfer_unit as u64;
                reply
            }
            RequestKind::Cleanup => Reply::ok(request),
            RequestKind::Create => self.create(conn, request),
            RequestKind::Open => self.open(conn, request),
            RequestKind::Remove => self.remove(conn, request),
            RequestKind::RemoveAll => {
                let mut reply = Reply::ok(request);
                reply.record.return_size = self.registry.remove_all() as u64;
                reply
            }
            RequestKind::GetServerPid => {
                let mut reply = Reply::ok(request);
                reply.record.return_size = u64::from(std::process::id());
                reply
            }
            RequestKind::GetFileSize => Reply::status(request, Status::NotSupported),
            RequestKind::SetDebugFlags => match self.registry.get_raw(request.handle) {
                Ok(disk) => {
                    disk.set_debug_flags(request.debug_flags);
                    Reply::ok(request)
                }
                Err(e) => Reply::status(request, Status::from(&e)),
            },
            RequestKind::GetDriveInfo => match self.registry.get_raw(request.handle) {
                Ok(disk) => {
                    let info = disk.info();
                    let mut reply = Reply::ok(request);
                    reply.record.repeat_count = info.records;
                    reply.record.return_size = info.bytes_allocated;
                    reply.record.block_size = info.block_size;
                    reply.record.requested_capacity = info.capacity;
                    reply
                }
                Err(e) => Reply::status(request, Status::from(&e)),
            },
            RequestKind::Read | RequestKind::Write | RequestKind::WriteSame => {
                self.block_io(conn, request, payload).await
            }
            RequestKind::Unknown(kind) => {
                warn!(kind, context = request.context, "unknown request kind");
                Reply::status(request, Status::UnknownRequest)
            }
        }
    }

    fn identity(request: &WireRecord) -> Result<DriveIdentity, Status> {
        DriveIdentity::new(request.identity.clone()).map_err(|e| {
            warn!(error = %e, context = request.context, "bad drive identity");
            Status::Failed
        })
    }

    fn create(&self, conn: ConnectionInfo, request: &WireRecord) -> Reply {
        let identity = match Self::identity(request) {
            Ok(identity) => identity,
            Err(status) => return Reply::status(request, status),
        };
        if request.block_size == 0 {
            return Reply::status(request, Status::Failed);
        }
        let capacity = match request.requested_capacity {
            0 => self.config.default_max_lba,
            n => n,
        };
        let spec = DiskSpec {
            block_size: request.block_size,
            capacity,
            location: request.location,
        };
        match self.registry.create(identity, spec, conn.side) {
            Ok((handle, _)) => {
                let mut reply = Reply::ok(request);
                reply.record.handle = handle.to_raw();
                reply
            }
            Err(e) => Reply::status(request, Status::from(&e)),
        }
    }

    fn open(&self, conn: ConnectionInfo, request: &WireRecord) -> Reply {
        let identity = match Self::identity(request) {
            Ok(identity) => identity,
            Err(status) => return Reply::status(request, status),
        };
        match self.registry.open(&identity, conn.side) {
            Ok((handle, disk)) => {
                let spec = disk.spec();
                let mut reply = Reply::ok(request);
                reply.record.handle = handle.to_raw();
                reply.record.block_size = spec.block_size;
                reply.record.requested_capacity = spec.capacity;
                reply.record.location = spec.location;
                reply
            }
            Err(e) => Reply::status(request, Status::from(&e)),
        }
    }

    fn remove(&self, conn: ConnectionInfo, request: &WireRecord) -> Reply {
        let identity = match Self::identity(request) {
            Ok(identity) => identity,
            Err(status) => return Reply::status(request, status),
        };
        match self.registry.remove(&identity, conn.side) {
            Ok(destroyed) => {
                let mut reply = Reply::ok(request);
                reply.record.return_size = u64::from(destroyed);
                reply
            }
            Err(e) => Reply::status(request, Status::from(&e)),
        }
    }

    /// Resolve the request's drive, creating it on first reference when the
    /// caller has no handle yet.
    fn resolve(
        &self,
        conn: ConnectionInfo,
        request: &WireRecord,
    ) -> Result<(u64, Arc<VirtualDisk>), Status> {
        if request.handle != INVALID_HANDLE {
            return match self.registry.get_raw(request.handle) {
                Ok(disk) => Ok((request.handle, disk)),
                Err(e) => {
                    warn!(
                        handle = request.handle,
                        context = request.context,
                        error = %e,
                        "rejecting request for bad handle"
                    );
                    Err(Status::from(&e))
                }
            };
        }
        let identity = Self::identity(request)?;
        let block_size = match request.block_size {
            0 => self.config.default_block_size,
            n => n,
        };
        let spec = DiskSpec {
            block_size,
            capacity: self.config.default_max_lba,
            location: request.location,
        };
        self.registry
            .open_or_create(&identity, spec, conn.side)
            .map(|(handle, disk)| (handle.to_raw(), disk))
            .map_err(|e: RegistryError| Status::from(&e))
    }

    async fn block_io(&self, conn: ConnectionInfo, request: &WireRecord, payload: Vec<u8>) -> Reply {
        let (handle, disk) = match self.resolve(conn, request) {
            Ok(resolved) => resolved,
            Err(status) => return Reply::status(request, status),
        };
        let Some(io) = block_range(request) else {
            warn!(
                kind = ?request.kind,
                byte_length = request.byte_length,
                block_size = request.block_size,
                "length does not match block size or exceeds payload limit"
            );
            return Reply::status(request, Status::BadLength);
        };

        let guard = self.outstanding.register(IoRequest {
            kind: request.kind,
            handle,
            io,
            side: conn.side,
            context: request.context,
        });

        let mut reply = Reply::ok(request);
        reply.record.handle = handle;
        let result = match request.kind {
            RequestKind::Read => disk
                .read(io.lba, io.blocks, io.block_size, &self.policy)
                .map(|outcome| {
                    reply.record.return_size = outcome.data.len() as u64;
                    reply.record.set_flag(flags::UNMAPPED, outcome.unmapped);
                    reply.record.set_flag(flags::COMPRESSED, outcome.compressed);
                    reply.data = Some(outcome.data);
                }),
            RequestKind::Write => disk.write(io.lba, io.blocks, io.block_size, &payload),
            _ => {
                let key = match request.key.as_deref().map(EncryptionKey::new).transpose() {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(error = %e, context = request.context, "bad zero key");
                        drop(guard);
                        return Reply::status(request, Status::Failed);
                    }
                };
                disk.write_same(
                    io.lba,
                    io.blocks,
                    io.block_size,
                    &payload,
                    key.as_ref(),
                    request.unmapped(),
                )
            }
        };

        let collisions = guard.collisions();
        let ok = match result {
            Ok(()) => true,
            Err(e) => {
                let status = Status::from(&e);
                if status == Status::OutOfMemory || status == Status::Integrity {
                    error!(disk = %disk.identity(), lba = io.lba, blocks = io.blocks, error = %e, "request failed");
                } else {
                    warn!(disk = %disk.identity(), lba = io.lba, blocks = io.blocks, error = %e, "request failed");
                }
                reply = Reply::status(request, status);
                reply.record.handle = handle;
                false
            }
        };
        reply.record.collision_count = collisions;

        let bytes = reply.data.as_ref().map_or(payload.len(), Vec::len) as u64;
        self.complete(CompletedIo {
            side: conn.side,
            kind: request.kind,
            handle,
            lba: io.lba,
            blocks: io.blocks,
            bytes,
            collisions,
            ok,
        })
        .await;

        // Reads stay registered until their payload is on the wire.
        if request.kind == RequestKind::Read && ok {
            reply.guard = Some(guard);
        }
        reply
    }

    async fn complete(&self, completed: CompletedIo) {
        if self.completions.send(completed).await.is_err() {
            debug!("stats worker gone, dropping completion");
        }
    }
}

/// Block range addressed by an I/O request, or `None` if its length does not
/// divide into whole blocks or is larger than one payload may be.
fn block_range(request: &WireRecord) -> Option<BlockIo> {
    if request.block_size == 0 || request.byte_length > protocol::MAX_PAYLOAD {
        return None;
    }
    let blocks = match request.kind {
        RequestKind::Read => {
            let bs = u64::from(request.block_size);
            (request.byte_length % bs == 0).then(|| request.byte_length / bs)?
        }
        RequestKind::Write => {
            let stored = stored_block_len(request.block_size) as u64;
            (stored != 0 && request.byte_length % stored == 0)
                .then(|| request.byte_length / stored)?
        }
        RequestKind::WriteSame => {
            let stored = stored_block_len(request.block_size) as u64;
            (request.byte_length == stored).then_some(request.repeat_count)?
        }
        _ => return None,
    };
    Some(BlockIo::new(request.lba, blocks, request.block_size))
}

/// Serve one connection until the peer sends CLEANUP or goes away
pub async fn handle_connection(
    dispatcher: Arc<Dispatcher>,
    stream: TcpStream,
    conn: ConnectionInfo,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();
    let max_transfer = dispatcher.config.max_transfer_unit;

    loop {
        let (request, malformed) = match protocol::read_record(&mut reader).await {
            Ok(request) => (request, None),
            Err(ProtocolError::Malformed { record, reason }) => (*record, Some(reason)),
            Err(ProtocolError::ConnectionClosed) => {
                debug!(side = %conn.side, "peer disconnected");
                return Ok(());
            }
            Err(e) => {
                error!(side = %conn.side, "Failed to read request: {}", e);
                return Err(ServerError::Protocol(e));
            }
        };

        debug!(side = %conn.side, kind = ?request.kind, context = request.context, "request");

        if request.kind.has_request_payload() && request.byte_length > protocol::MAX_PAYLOAD {
            warn!(
                side = %conn.side,
                context = request.context,
                byte_length = request.byte_length,
                "payload too large, closing connection"
            );
            let reply = Reply::rejected(&request, Status::BadLength);
            protocol::write_record(&mut writer, &reply.record).await?;
            return Err(ServerError::Protocol(ProtocolError::PayloadTooLarge {
                size: request.byte_length,
                max: protocol::MAX_PAYLOAD,
            }));
        }

        let payload = if request.kind.has_request_payload() {
            let read = protocol::read_payload(&mut reader, request.byte_length, max_transfer);
            match tokio::time::timeout(dispatcher.config.payload_timeout, read).await {
                Ok(Ok(payload)) => payload,
                Ok(Err(e)) => {
                    error!(side = %conn.side, context = request.context, "Failed to read payload: {}", e);
                    return Err(ServerError::Protocol(e));
                }
                Err(_) => {
                    error!(side = %conn.side, context = request.context, "payload read timeout");
                    return Err(ServerError::Timeout);
                }
            }
        } else {
            Vec::new()
        };

        let reply = match malformed {
            Some(reason) => {
                warn!(side = %conn.side, context = request.context, %reason, "malformed request");
                Reply::rejected(&request, Status::Failed)
            }
            None => dispatcher.dispatch(conn, &request, payload).await,
        };
        protocol::write_record(&mut writer, &reply.record).await?;
        if let Some(data) = &reply.data {
            protocol::write_payload(&mut writer, data, max_transfer).await?;
        }
        drop(reply.guard);

        if request.kind == RequestKind::Cleanup {
            debug!(side = %conn.side, "cleanup received, closing connection");
            return Ok(());
        }
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
