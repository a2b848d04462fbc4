//! Two connections share one drive namespace.

use crate::prelude::*;
use vdisk_core::{BlockIo, DriveBackend};

#[tokio::test]
async fn connections_are_assigned_distinct_sides() {
    let daemon = Daemon::start().await;
    let a = daemon.client().await;
    let b = daemon.client().await;

    assert_eq!(a.connection().side(), 0);
    assert_eq!(b.connection().side(), 1);
    assert_ne!(a.connection().transfer_id(), b.connection().transfer_id());

    a.connection().shutdown().await.unwrap();
    b.connection().shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn writes_from_one_side_are_visible_to_the_other() {
    let daemon = Daemon::start().await;
    let a = daemon.client().await;
    let b = daemon.client().await;

    let handle = a.create(&identity("PEER"), user_drive(128)).await.unwrap();
    a.write(handle, BlockIo::new(3, 2, 520), vec![0x42; 2 * 520])
        .await
        .unwrap();

    let peer_handle = b.open(&identity("PEER")).await.unwrap();
    assert_eq!(peer_handle, handle);
    let outcome = b.read(peer_handle, BlockIo::new(3, 2, 520)).await.unwrap();
    assert_eq!(outcome.data, vec![0x42; 2 * 520]);

    let pid = b.server_pid().await.unwrap();
    assert_eq!(pid, std::process::id());

    a.connection().shutdown().await.unwrap();
    b.connection().shutdown().await.unwrap();
    daemon.stop().await;
}
