//! Drive lifecycle over the wire: create, write, read, write-same, remove.

use crate::prelude::*;
use vdisk_core::{BackendError, BlockIo, DriveBackend, ZeroOptions};

#[tokio::test]
async fn create_write_read_remove_scenario() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;

    let handle = client.create(&identity("D1"), user_drive(1001)).await.unwrap();

    let data = vec![0xAA; 2 * 520];
    client
        .write(handle, BlockIo::new(100, 2, 520), data.clone())
        .await
        .unwrap();
    let outcome = client.read(handle, BlockIo::new(100, 2, 520)).await.unwrap();
    assert_eq!(outcome.data, data);

    let pattern: Vec<u8> = (0..520u32).map(|i| (i * 7) as u8).collect();
    client
        .write_same(
            handle,
            BlockIo::new(100, 2, 520),
            pattern.clone(),
            ZeroOptions::default(),
        )
        .await
        .unwrap();
    let outcome = client.read(handle, BlockIo::new(100, 2, 520)).await.unwrap();
    assert_eq!(outcome.data, [pattern.clone(), pattern].concat());

    client.remove(&identity("D1")).await.unwrap();
    assert!(matches!(
        client.open(&identity("D1")).await,
        Err(BackendError::Remote { status: -2 })
    ));

    client.connection().shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn adjacent_writes_coalesce_into_one_record() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let handle = client.create(&identity("MERGE"), user_drive(100)).await.unwrap();

    client
        .write(handle, BlockIo::new(0, 10, 520), vec![1; 10 * 520])
        .await
        .unwrap();
    client
        .write(handle, BlockIo::new(10, 10, 520), vec![2; 10 * 520])
        .await
        .unwrap();
    client
        .write(handle, BlockIo::new(5, 10, 520), vec![3; 10 * 520])
        .await
        .unwrap();

    let info = client.drive_info(handle).await.unwrap();
    assert_eq!(info.records, 1);
    assert_eq!(info.bytes_allocated, 20 * 520);

    let outcome = client.read(handle, BlockIo::new(0, 20, 520)).await.unwrap();
    let expected = [vec![1; 5 * 520], vec![3; 10 * 520], vec![2; 5 * 520]].concat();
    assert_eq!(outcome.data, expected);

    client.connection().shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn recreate_discards_previous_data() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let old = client.create(&identity("AGAIN"), user_drive(100)).await.unwrap();
    client
        .write(old, BlockIo::new(0, 1, 520), vec![9; 520])
        .await
        .unwrap();

    let new = client.create(&identity("AGAIN"), user_drive(100)).await.unwrap();
    assert_ne!(old, new);
    assert!(matches!(
        client.read(old, BlockIo::new(0, 1, 520)).await,
        Err(BackendError::Remote { status: -3 })
    ));
    assert_eq!(client.drive_info(new).await.unwrap().records, 0);

    client.connection().shutdown().await.unwrap();
    daemon.stop().await;
}
