// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One sparse file per drive
//!
//! Blocks are stored at `lba × stored_block_len(block_size)`. A sidecar TOML
//! file keeps the drive's geometry so it can be opened again later.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

use super::{BackendError, BlockIo, DriveBackend, ZeroOptions};
use crate::codec::{is_compressed_block_size, stored_block_len};
use crate::disk::{DiskSpec, DriveIdentity, DriveInfo};
use crate::journal::{JournalError, ReadOutcome};
use crate::pattern::{apply_key, fill_zero_block, payload_is_zero};
use crate::registry::{DriveHandle, RegistryError};

const DATA_EXT: &str = "img";
const SPEC_EXT: &str = "toml";

#[derive(Debug, Clone)]
struct FileDrive {
    identity: DriveIdentity,
    spec: DiskSpec,
    path: PathBuf,
    debug_flags: u32,
}

#[derive(Debug, Default)]
struct Table {
    slots: Vec<(u32, Option<FileDrive>)>,
}

/// Backend storing drives as files under one directory
#[derive(Debug)]
pub struct LocalFileBackend {
    dir: PathBuf,
    table: Mutex<Table>,
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn spec_error(e: impl std::fmt::Display) -> BackendError {
    BackendError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        e.to_string(),
    ))
}

impl LocalFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            table: Mutex::new(Table::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn paths(&self, identity: &DriveIdentity) -> (PathBuf, PathBuf) {
        let stem = hex_encode(identity.as_bytes());
        (
            self.dir.join(format!("{stem}.{DATA_EXT}")),
            self.dir.join(format!("{stem}.{SPEC_EXT}")),
        )
    }

    fn attach(&self, drive: FileDrive) -> DriveHandle {
        let mut table = self.table();
        if let Some(slot) = table
            .slots
            .iter()
            .position(|(_, d)| d.as_ref().is_some_and(|d| d.identity == drive.identity))
        {
            let (generation, entry) = &mut table.slots[slot];
            *entry = Some(drive);
            return DriveHandle::new(slot as u32, *generation);
        }
        match table.slots.iter().position(|(_, d)| d.is_none()) {
            Some(slot) => {
                let (generation, entry) = &mut table.slots[slot];
                *entry = Some(drive);
                DriveHandle::new(slot as u32, *generation)
            }
            None => {
                table.slots.push((0, Some(drive)));
                DriveHandle::new((table.slots.len() - 1) as u32, 0)
            }
        }
    }

    fn detach(&self, identity: &DriveIdentity) {
        let mut table = self.table();
        for (generation, entry) in table.slots.iter_mut() {
            if entry.as_ref().is_some_and(|d| &d.identity == identity) {
                *entry = None;
                *generation = generation.wrapping_add(1);
            }
        }
    }

    fn drive(&self, handle: DriveHandle) -> Result<FileDrive, BackendError> {
        let table = self.table();
        let raw = handle.to_raw();
        match table.slots.get(handle.slot() as usize) {
            Some((generation, Some(drive))) if *generation == handle.generation() => {
                Ok(drive.clone())
            }
            Some(_) => Err(RegistryError::StaleHandle(raw).into()),
            None => Err(RegistryError::InvalidHandle(raw).into()),
        }
    }

    async fn write_at(
        &self,
        drive: &FileDrive,
        io: BlockIo,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        check_range(drive, io)?;
        let offset = io.lba * stored_block_len(io.block_size) as u64;
        let mut file = OpenOptions::new().write(true).open(&drive.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        if drive.debug_flags != 0 {
            debug!(disk = %drive.identity, lba = io.lba, blocks = io.blocks, "file write");
        }
        Ok(())
    }
}

fn check_range(drive: &FileDrive, io: BlockIo) -> Result<(), JournalError> {
    match io.lba.checked_add(io.blocks) {
        Some(end) if end <= drive.spec.capacity => Ok(()),
        _ => Err(JournalError::OutOfRange {
            lba: io.lba,
            blocks: io.blocks,
            capacity: drive.spec.capacity,
        }),
    }
}

#[async_trait]
impl DriveBackend for LocalFileBackend {
    async fn create(
        &self,
        identity: &DriveIdentity,
        spec: DiskSpec,
    ) -> Result<DriveHandle, BackendError> {
        fs::create_dir_all(&self.dir).await?;
        let (path, spec_path) = self.paths(identity);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;
        file.sync_all().await?;
        fs::write(&spec_path, toml::to_string(&spec).map_err(spec_error)?).await?;

        info!(disk = %identity, path = %path.display(), "file drive created");
        Ok(self.attach(FileDrive {
            identity: identity.clone(),
            spec,
            path,
            debug_flags: 0,
        }))
    }

    async fn open(&self, identity: &DriveIdentity) -> Result<DriveHandle, BackendError> {
        let (path, spec_path) = self.paths(identity);
        let text = match fs::read_to_string(&spec_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(identity.clone()).into());
            }
            Err(e) => return Err(e.into()),
        };
        let spec: DiskSpec = toml::from_str(&text).map_err(spec_error)?;
        Ok(self.attach(FileDrive {
            identity: identity.clone(),
            spec,
            path,
            debug_flags: 0,
        }))
    }

    async fn remove(&self, identity: &DriveIdentity) -> Result<(), BackendError> {
        let (path, spec_path) = self.paths(identity);
        if fs::metadata(&spec_path).await.is_err() {
            return Err(RegistryError::NotFound(identity.clone()).into());
        }
        self.detach(identity);
        fs::remove_file(&spec_path).await?;
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        info!(disk = %identity, "file drive removed");
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), BackendError> {
        {
            let mut table = self.table();
            for (generation, entry) in table.slots.iter_mut() {
                if entry.take().is_some() {
                    *generation = generation.wrapping_add(1);
                }
            }
        }
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let ours = path
                .extension()
                .is_some_and(|ext| ext == DATA_EXT || ext == SPEC_EXT);
            if ours {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    async fn read(&self, handle: DriveHandle, io: BlockIo) -> Result<ReadOutcome, BackendError> {
        let drive = self.drive(handle)?;
        check_range(&drive, io)?;
        let stored = stored_block_len(io.block_size);
        let len = io.blocks as usize * stored;
        let mut data = vec![0u8; len];

        let mut file = fs::File::open(&drive.path).await?;
        file.seek(SeekFrom::Start(io.lba * stored as u64)).await?;
        let mut filled = 0;
        while filled < len {
            let n = file.read(&mut data[filled..]).await?;
            if n == 0 {
                // Past the end of a sparse file
                break;
            }
            filled += n;
        }
        Ok(ReadOutcome {
            data,
            unmapped: false,
            compressed: is_compressed_block_size(io.block_size),
        })
    }

    async fn write(
        &self,
        handle: DriveHandle,
        io: BlockIo,
        data: Vec<u8>,
    ) -> Result<(), BackendError> {
        let drive = self.drive(handle)?;
        let expected = io.blocks as usize * stored_block_len(io.block_size);
        if data.len() != expected {
            return Err(JournalError::BadLength {
                expected,
                actual: data.len(),
            }
            .into());
        }
        self.write_at(&drive, io, &data).await
    }

    async fn write_same(
        &self,
        handle: DriveHandle,
        io: BlockIo,
        pattern: Vec<u8>,
        zero: ZeroOptions,
    ) -> Result<(), BackendError> {
        let drive = self.drive(handle)?;
        let stored = stored_block_len(io.block_size);
        if pattern.len() != stored {
            return Err(JournalError::BadLength {
                expected: stored,
                actual: pattern.len(),
            }
            .into());
        }

        let mut block = pattern;
        let plain = !is_compressed_block_size(io.block_size);
        if plain && (zero.unmapped || payload_is_zero(&block)) {
            fill_zero_block(&mut block, zero.unmapped);
            if let Some(key) = &zero.key {
                apply_key(&mut block, key);
            }
        }
        let bytes = block.repeat(io.blocks as usize);
        self.write_at(&drive, io, &bytes).await
    }

    async fn drive_info(&self, handle: DriveHandle) -> Result<DriveInfo, BackendError> {
        let drive = self.drive(handle)?;
        let len = fs::metadata(&drive.path).await?.len();
        Ok(DriveInfo {
            records: 0,
            bytes_allocated: len,
            block_size: drive.spec.block_size,
            capacity: drive.spec.capacity,
        })
    }

    async fn set_debug_flags(&self, handle: DriveHandle, flags: u32) -> Result<(), BackendError> {
        self.drive(handle)?;
        let mut table = self.table();
        if let Some((_, Some(drive))) = table.slots.get_mut(handle.slot() as usize) {
            drive.debug_flags = flags;
        }
        Ok(())
    }

    async fn server_pid(&self) -> Result<u32, BackendError> {
        Ok(std::process::id())
    }

    async fn file_size(&self, identity: &DriveIdentity) -> Result<u64, BackendError> {
        let (path, _) = self.paths(identity);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RegistryError::NotFound(identity.clone()).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
