// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::pattern::{DriveLocation, SECTOR_PAYLOAD, SECTOR_SIZE, ZERO_METADATA};
use tempfile::TempDir;

const BS: u32 = SECTOR_SIZE as u32;

fn spec() -> DiskSpec {
    DiskSpec {
        block_size: BS,
        capacity: 64,
        location: DriveLocation::new(1, 0, 4),
    }
}

fn identity() -> DriveIdentity {
    DriveIdentity::new("FILE-1").unwrap()
}

#[tokio::test]
async fn unwritten_blocks_read_as_zero() {
    let dir = TempDir::new().unwrap();
    let backend = LocalFileBackend::new(dir.path());
    let handle = backend.create(&identity(), spec()).await.unwrap();

    let out = backend.read(handle, BlockIo::new(10, 2, BS)).await.unwrap();
    assert_eq!(out.data, vec![0u8; 2 * SECTOR_SIZE]);
    assert!(!out.compressed);
}

#[tokio::test]
async fn write_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let handle = {
        let backend = LocalFileBackend::new(dir.path());
        let handle = backend.create(&identity(), spec()).await.unwrap();
        backend
            .write(handle, BlockIo::new(3, 1, BS), vec![0x42; SECTOR_SIZE])
            .await
            .unwrap();
        handle
    };

    let backend = LocalFileBackend::new(dir.path());
    let reopened = backend.open(&identity()).await.unwrap();
    assert_eq!(reopened.slot(), handle.slot());
    let out = backend.read(reopened, BlockIo::new(3, 1, BS)).await.unwrap();
    assert_eq!(out.data, vec![0x42; SECTOR_SIZE]);
    assert_eq!(
        backend.file_size(&identity()).await.unwrap(),
        4 * SECTOR_SIZE as u64
    );
}

#[tokio::test]
async fn zero_write_same_renders_zero_pattern() {
    let dir = TempDir::new().unwrap();
    let backend = LocalFileBackend::new(dir.path());
    let handle = backend.create(&identity(), spec()).await.unwrap();

    backend
        .write_same(
            handle,
            BlockIo::new(0, 2, BS),
            vec![0u8; SECTOR_SIZE],
            ZeroOptions::default(),
        )
        .await
        .unwrap();
    let out = backend.read(handle, BlockIo::new(1, 1, BS)).await.unwrap();
    assert_eq!(&out.data[SECTOR_PAYLOAD..], &ZERO_METADATA.to_le_bytes());
}

#[tokio::test]
async fn out_of_range_write_is_rejected() {
    let dir = TempDir::new().unwrap();
    let backend = LocalFileBackend::new(dir.path());
    let handle = backend.create(&identity(), spec()).await.unwrap();

    let err = backend
        .write(handle, BlockIo::new(64, 1, BS), vec![0u8; SECTOR_SIZE])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BackendError::Journal(JournalError::OutOfRange { .. })
    ));
}

#[tokio::test]
async fn remove_deletes_files_and_invalidates_handle() {
    let dir = TempDir::new().unwrap();
    let backend = LocalFileBackend::new(dir.path());
    let handle = backend.create(&identity(), spec()).await.unwrap();

    backend.remove(&identity()).await.unwrap();
    assert!(backend.read(handle, BlockIo::new(0, 1, BS)).await.is_err());
    assert!(matches!(
        backend.open(&identity()).await,
        Err(BackendError::Registry(RegistryError::NotFound(_)))
    ));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn remove_all_clears_directory() {
    let dir = TempDir::new().unwrap();
    let backend = LocalFileBackend::new(dir.path());
    backend.create(&identity(), spec()).await.unwrap();
    backend
        .create(&DriveIdentity::new("FILE-2").unwrap(), spec())
        .await
        .unwrap();

    backend.remove_all().await.unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
