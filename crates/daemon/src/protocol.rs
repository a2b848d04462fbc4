// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol between the client multiplexer and the daemon.
//!
//! Every request and response is one fixed-size [`RECORD_SIZE`]-byte record,
//! little-endian throughout. Bulk data follows the record as raw bytes of the
//! declared length: after a WRITE/WRITE_SAME request, and after a successful
//! READ response. Payloads are moved in chunks of at most the configured
//! transfer unit.
//!
//! Record layout (byte offsets):
//!
//! ```text
//!   0 kind u32           4 side u32           8 identity [32]
//!  40 handle u64        48 lba u64           56 byte_length u64
//!  64 repeat_count u64  72 return_value i64  80 requested_capacity u64
//!  88 return_size u64   96 transfer_id u64  104 context u64
//! 112 block_size u32   116 collision_count  120 flags u32
//! 124 key_len u32      128 key [32]         160 bus u16, enclosure u16, slot u16
//! 168 debug_flags u32  172 reserved
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use vdisk_core::{BackendError, DriveLocation, JournalError, RegistryError};

/// Size of one fixed request/response record
pub const RECORD_SIZE: usize = 176;

/// Identity bytes carried in a record
pub const IDENTITY_LEN: usize = 32;

/// Key bytes carried in a record
pub const KEY_LEN: usize = 32;

/// Default chunk size for payload transfers
pub const DEFAULT_MAX_TRANSFER: usize = 64 * 1024;

/// Largest payload either side accepts
pub const MAX_PAYLOAD: u64 = 256 * 1024 * 1024;

/// Default timeout for handshake reads
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw handle meaning "resolve by identity"
pub const INVALID_HANDLE: u64 = u64::MAX;

/// Record flag bits
pub mod flags {
    pub const KEY_VALID: u32 = 0x1;
    pub const UNMAPPED: u32 = 0x2;
    pub const COMPRESSED: u32 = 0x4;
}

/// Request type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Init,
    Cleanup,
    Create,
    Open,
    Remove,
    RemoveAll,
    Read,
    Write,
    WriteSame,
    GetServerPid,
    GetFileSize,
    SetDebugFlags,
    GetDriveInfo,
    Unknown(u32),
}

impl RequestKind {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Init,
            2 => Self::Cleanup,
            3 => Self::Create,
            4 => Self::Open,
            5 => Self::Remove,
            6 => Self::RemoveAll,
            7 => Self::Read,
            8 => Self::Write,
            9 => Self::WriteSame,
            10 => Self::GetServerPid,
            11 => Self::GetFileSize,
            12 => Self::SetDebugFlags,
            13 => Self::GetDriveInfo,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            Self::Init => 1,
            Self::Cleanup => 2,
            Self::Create => 3,
            Self::Open => 4,
            Self::Remove => 5,
            Self::RemoveAll => 6,
            Self::Read => 7,
            Self::Write => 8,
            Self::WriteSame => 9,
            Self::GetServerPid => 10,
            Self::GetFileSize => 11,
            Self::SetDebugFlags => 12,
            Self::GetDriveInfo => 13,
            Self::Unknown(other) => other,
        }
    }

    /// Block I/O requests, tracked for collisions
    pub fn is_io(self) -> bool {
        matches!(self, Self::Read | Self::Write | Self::WriteSame)
    }

    /// Requests followed by a payload from the client
    pub fn has_request_payload(self) -> bool {
        matches!(self, Self::Write | Self::WriteSame)
    }
}

/// Result codes carried in `return_value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed,
    NotFound,
    InvalidHandle,
    UnknownRequest,
    OutOfMemory,
    Integrity,
    NotSupported,
    OutOfRange,
    BadLength,
}

impl Status {
    pub fn code(self) -> i64 {
        match self {
            Self::Ok => 0,
            Self::Failed => -1,
            Self::NotFound => -2,
            Self::InvalidHandle => -3,
            Self::UnknownRequest => -4,
            Self::OutOfMemory => -5,
            Self::Integrity => -6,
            Self::NotSupported => -7,
            Self::OutOfRange => -8,
            Self::BadLength => -9,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            c if c >= 0 => Self::Ok,
            -2 => Self::NotFound,
            -3 => Self::InvalidHandle,
            -4 => Self::UnknownRequest,
            -5 => Self::OutOfMemory,
            -6 => Self::Integrity,
            -7 => Self::NotSupported,
            -8 => Self::OutOfRange,
            -9 => Self::BadLength,
            _ => Self::Failed,
        }
    }

    /// Protocol errors make the caller treat the answer as suspect.
    pub fn is_protocol_error(self) -> bool {
        matches!(self, Self::InvalidHandle | Self::UnknownRequest)
    }
}

impl From<&JournalError> for Status {
    fn from(e: &JournalError) -> Self {
        match e {
            JournalError::OutOfMemory { .. } => Status::OutOfMemory,
            JournalError::BadLength { .. } => Status::BadLength,
            JournalError::OutOfRange { .. } => Status::OutOfRange,
            JournalError::UnwrittenRead { .. } | JournalError::Codec(_) => Status::Integrity,
            JournalError::InvalidBlockSize(_) | JournalError::InvalidKey(_) => Status::Failed,
        }
    }
}

impl From<&RegistryError> for Status {
    fn from(e: &RegistryError) -> Self {
        match e {
            RegistryError::NotFound(_) => Status::NotFound,
            RegistryError::InvalidHandle(_) | RegistryError::StaleHandle(_) => {
                Status::InvalidHandle
            }
            RegistryError::Full { .. } => Status::OutOfMemory,
        }
    }
}

impl From<&BackendError> for Status {
    fn from(e: &BackendError) -> Self {
        match e {
            BackendError::Journal(e) => e.into(),
            BackendError::Registry(e) => e.into(),
            BackendError::NotSupported(_) => Status::NotSupported,
            BackendError::Remote { status } => Status::from_code(*status),
            BackendError::Io(_) | BackendError::Transport(_) => Status::Failed,
        }
    }
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unknown request kind {0}")]
    UnknownKind(u32),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Timeout")]
    Timeout,

    #[error("Identity too long: {0} bytes")]
    IdentityTooLong(usize),

    #[error("Key too long: {0} bytes")]
    KeyTooLong(usize),

    /// The record arrived whole but a field is invalid. `record` holds the
    /// other fields so the sender can still be answered.
    #[error("Malformed record: {reason}")]
    Malformed {
        record: Box<WireRecord>,
        reason: String,
    },
}

/// One fixed-size request or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRecord {
    pub kind: RequestKind,
    pub side: u32,
    pub identity: Vec<u8>,
    pub handle: u64,
    pub lba: u64,
    pub byte_length: u64,
    pub repeat_count: u64,
    pub return_value: i64,
    pub requested_capacity: u64,
    pub return_size: u64,
    /// Server-assigned connection id
    pub transfer_id: u64,
    /// Client request id, echoed unchanged
    pub context: u64,
    pub block_size: u32,
    pub collision_count: u32,
    /// `UNMAPPED` / `COMPRESSED`; `KEY_VALID` follows `key`
    pub flags: u32,
    pub key: Option<Vec<u8>>,
    pub location: DriveLocation,
    pub debug_flags: u32,
}

impl WireRecord {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            side: 0,
            identity: Vec::new(),
            handle: INVALID_HANDLE,
            lba: 0,
            byte_length: 0,
            repeat_count: 0,
            return_value: 0,
            requested_capacity: 0,
            return_size: 0,
            transfer_id: 0,
            context: 0,
            block_size: 0,
            collision_count: 0,
            flags: 0,
            key: None,
            location: DriveLocation::default(),
            debug_flags: 0,
        }
    }

    /// A response echoing this request, with `status` set.
    pub fn reply(&self, status: Status) -> Self {
        let mut response = self.clone();
        response.return_value = status.code();
        response.return_size = 0;
        if status.is_protocol_error() {
            response.collision_count = 1;
        }
        response
    }

    pub fn status(&self) -> Status {
        Status::from_code(self.return_value)
    }

    pub fn unmapped(&self) -> bool {
        self.flags & flags::UNMAPPED != 0
    }

    pub fn compressed(&self) -> bool {
        self.flags & flags::COMPRESSED != 0
    }

    pub fn set_flag(&mut self, flag: u32, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    pub fn encode(&self) -> Result<[u8; RECORD_SIZE], ProtocolError> {
        if self.identity.len() > IDENTITY_LEN {
            return Err(ProtocolError::IdentityTooLong(self.identity.len()));
        }
        let key = self.key.as_deref().unwrap_or_default();
        if key.len() > KEY_LEN {
            return Err(ProtocolError::KeyTooLong(key.len()));
        }
        let mut record_flags = self.flags & !flags::KEY_VALID;
        if self.key.is_some() {
            record_flags |= flags::KEY_VALID;
        }

        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.kind.to_u32().to_le_bytes());
        buf[4..8].copy_from_slice(&self.side.to_le_bytes());
        buf[8..8 + self.identity.len()].copy_from_slice(&self.identity);
        buf[40..48].copy_from_slice(&self.handle.to_le_bytes());
        buf[48..56].copy_from_slice(&self.lba.to_le_bytes());
        buf[56..64].copy_from_slice(&self.byte_length.to_le_bytes());
        buf[64..72].copy_from_slice(&self.repeat_count.to_le_bytes());
        buf[72..80].copy_from_slice(&self.return_value.to_le_bytes());
        buf[80..88].copy_from_slice(&self.requested_capacity.to_le_bytes());
        buf[88..96].copy_from_slice(&self.return_size.to_le_bytes());
        buf[96..104].copy_from_slice(&self.transfer_id.to_le_bytes());
        buf[104..112].copy_from_slice(&self.context.to_le_bytes());
        buf[112..116].copy_from_slice(&self.block_size.to_le_bytes());
        buf[116..120].copy_from_slice(&self.collision_count.to_le_bytes());
        buf[120..124].copy_from_slice(&record_flags.to_le_bytes());
        buf[124..128].copy_from_slice(&(key.len() as u32).to_le_bytes());
        buf[128..128 + key.len()].copy_from_slice(key);
        buf[160..162].copy_from_slice(&self.location.bus.to_le_bytes());
        buf[162..164].copy_from_slice(&self.location.enclosure.to_le_bytes());
        buf[164..166].copy_from_slice(&self.location.slot.to_le_bytes());
        buf[168..172].copy_from_slice(&self.debug_flags.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(buf: &[u8; RECORD_SIZE]) -> Result<Self, ProtocolError> {
        let record_flags = u32_at(buf, 120);
        let key_len = u32_at(buf, 124) as usize;
        let key_valid = record_flags & flags::KEY_VALID != 0 && key_len <= KEY_LEN;
        let identity = &buf[8..40];
        let identity_len = identity
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);

        let record = Self {
            kind: RequestKind::from_u32(u32_at(buf, 0)),
            side: u32_at(buf, 4),
            identity: identity[..identity_len].to_vec(),
            handle: u64_at(buf, 40),
            lba: u64_at(buf, 48),
            byte_length: u64_at(buf, 56),
            repeat_count: u64_at(buf, 64),
            return_value: u64_at(buf, 72) as i64,
            requested_capacity: u64_at(buf, 80),
            return_size: u64_at(buf, 88),
            transfer_id: u64_at(buf, 96),
            context: u64_at(buf, 104),
            block_size: u32_at(buf, 112),
            collision_count: u32_at(buf, 116),
            flags: record_flags & !flags::KEY_VALID,
            key: key_valid.then(|| buf[128..128 + key_len].to_vec()),
            location: DriveLocation::new(u16_at(buf, 160), u16_at(buf, 162), u16_at(buf, 164)),
            debug_flags: u32_at(buf, 168),
        };
        if key_len > KEY_LEN {
            return Err(ProtocolError::Malformed {
                record: Box::new(record),
                reason: format!("key length {} exceeds {}", key_len, KEY_LEN),
            });
        }
        Ok(record)
    }
}

fn u16_at(buf: &[u8], offset: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_le_bytes(bytes)
}

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn u64_at(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Read one fixed record
pub async fn read_record<R: AsyncRead + Unpin>(reader: &mut R) -> Result<WireRecord, ProtocolError> {
    let mut buf = [0u8; RECORD_SIZE];
    match reader.read_exact(&mut buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    WireRecord::decode(&buf)
}

/// Read one fixed record with timeout
pub async fn read_record_timeout<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<WireRecord, ProtocolError> {
    tokio::time::timeout(timeout, read_record(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Write one fixed record
pub async fn write_record<W: AsyncWrite + Unpin>(
    writer: &mut W,
    record: &WireRecord,
) -> Result<(), ProtocolError> {
    let buf = record.encode()?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a payload of `len` bytes in chunks of at most `max_transfer`
pub async fn read_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: u64,
    max_transfer: usize,
) -> Result<Vec<u8>, ProtocolError> {
    if len > MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD,
        });
    }
    let mut payload = vec![0u8; len as usize];
    for chunk in payload.chunks_mut(max_transfer.max(1)) {
        match reader.read_exact(chunk).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::ConnectionClosed);
            }
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }
    Ok(payload)
}

/// Write a payload in chunks of at most `max_transfer`
pub async fn write_payload<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    max_transfer: usize,
) -> Result<(), ProtocolError> {
    if payload.len() as u64 > MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len() as u64,
            max: MAX_PAYLOAD,
        });
    }
    for chunk in payload.chunks(max_transfer.max(1)) {
        writer.write_all(chunk).await?;
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
