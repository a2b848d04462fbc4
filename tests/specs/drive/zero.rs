//! Write-same zeroing: unmapped flags and encrypted zero patterns.

use crate::prelude::*;
use vdisk_core::{BlockIo, DriveBackend, EncryptionKey, ZeroOptions};

#[tokio::test]
async fn unmapped_zero_reads_back_flagged() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let handle = client.create(&identity("UNMAP"), user_drive(64)).await.unwrap();

    client
        .write(handle, BlockIo::new(8, 4, 520), vec![0x55; 4 * 520])
        .await
        .unwrap();
    client
        .write_same(
            handle,
            BlockIo::new(8, 4, 520),
            vec![0; 520],
            ZeroOptions {
                key: None,
                unmapped: true,
            },
        )
        .await
        .unwrap();

    let outcome = client.read(handle, BlockIo::new(8, 4, 520)).await.unwrap();
    assert!(outcome.unmapped);
    assert_eq!(outcome.data.len(), 4 * 520);
    // Unmapped blocks carry no metadata checksum.
    assert!(outcome.data.iter().all(|&b| b == 0));

    let mapped = client.read(handle, BlockIo::new(0, 4, 520)).await.unwrap();
    assert!(!mapped.unmapped);

    client.connection().shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn keyed_zero_differs_from_plain_zero() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let handle = client.create(&identity("KEYED"), user_drive(64)).await.unwrap();

    client
        .write_same(
            handle,
            BlockIo::new(0, 1, 520),
            vec![0; 520],
            ZeroOptions::default(),
        )
        .await
        .unwrap();
    let key = EncryptionKey::new(vec![0x3C; 32]).unwrap();
    client
        .write_same(
            handle,
            BlockIo::new(1, 1, 520),
            vec![0; 520],
            ZeroOptions {
                key: Some(key),
                unmapped: false,
            },
        )
        .await
        .unwrap();

    let outcome = client.read(handle, BlockIo::new(0, 2, 520)).await.unwrap();
    let (plain, keyed) = outcome.data.split_at(520);
    assert!(plain[..512].iter().all(|&b| b == 0));
    assert!(plain[512..].iter().any(|&b| b != 0));
    assert_ne!(plain, keyed);

    client.connection().shutdown().await.unwrap();
    daemon.stop().await;
}
