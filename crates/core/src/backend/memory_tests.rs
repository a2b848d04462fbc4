// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::pattern::{DriveLocation, SECTOR_SIZE};
use crate::registry::RegistryOptions;

const BS: u32 = SECTOR_SIZE as u32;

fn backend(side: Side, registry: &Arc<Registry>) -> InMemoryBackend {
    InMemoryBackend::new(Arc::clone(registry), side, FillPolicy::strict())
}

fn spec() -> DiskSpec {
    DiskSpec {
        block_size: BS,
        capacity: 1000,
        location: DriveLocation::new(2, 1, 9),
    }
}

#[tokio::test]
async fn write_then_read_through_backend() {
    let registry = Arc::new(Registry::new(RegistryOptions::default()));
    let backend = backend(Side::A, &registry);
    let identity = DriveIdentity::new("D1").unwrap();

    let handle = backend.create(&identity, spec()).await.unwrap();
    backend
        .write(handle, BlockIo::new(100, 2, BS), vec![0xAA; 2 * SECTOR_SIZE])
        .await
        .unwrap();
    let out = backend.read(handle, BlockIo::new(100, 2, BS)).await.unwrap();
    assert_eq!(out.data, vec![0xAA; 2 * SECTOR_SIZE]);

    let info = backend.drive_info(handle).await.unwrap();
    assert_eq!(info.records, 1);
    assert_eq!(info.bytes_allocated, 2 * SECTOR_SIZE as u64);
}

#[tokio::test]
async fn sides_share_one_registry() {
    let registry = Arc::new(Registry::new(RegistryOptions::default()));
    let spa = backend(Side::A, &registry);
    let spb = backend(Side::B, &registry);
    let identity = DriveIdentity::new("shared").unwrap();

    spa.create(&identity, spec()).await.unwrap();
    spb.open(&identity).await.unwrap();
    spa.remove(&identity).await.unwrap();
    assert!(spb.open(&identity).await.is_ok());
    spb.remove(&identity).await.unwrap();
    assert!(matches!(
        spa.open(&identity).await,
        Err(BackendError::Registry(_))
    ));
}

#[tokio::test]
async fn file_size_is_not_supported() {
    let registry = Arc::new(Registry::new(RegistryOptions::default()));
    let backend = backend(Side::A, &registry);
    let identity = DriveIdentity::new("D1").unwrap();
    assert!(matches!(
        backend.file_size(&identity).await,
        Err(BackendError::NotSupported(_))
    ));
    assert_eq!(backend.server_pid().await.unwrap(), std::process::id());
}
