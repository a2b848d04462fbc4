//! Collision detection across connections.

use crate::prelude::*;
use vdisk_core::{BlockIo, DriveBackend, Side};
use vdisk_daemon::collision::IoRequest;
use vdisk_daemon::protocol::{RequestKind, WireRecord};

fn read_record(handle: u64, lba: u64, blocks: u64) -> WireRecord {
    let mut record = WireRecord::new(RequestKind::Read);
    record.handle = handle;
    record.lba = lba;
    record.byte_length = blocks * 520;
    record.block_size = 520;
    record
}

#[tokio::test]
async fn read_overlapping_inflight_write_reports_collision() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let handle = client
        .create(&identity("SHARED"), user_drive(256))
        .await
        .unwrap()
        .to_raw();

    // Another side's write in flight over blocks 10..20
    let writer = daemon.dispatcher.outstanding().register(IoRequest {
        kind: RequestKind::Write,
        handle,
        io: BlockIo::new(10, 10, 520),
        side: Side::B,
        context: 99,
    });

    let completion = client
        .connection()
        .request(read_record(handle, 15, 2), None)
        .await
        .unwrap();
    assert_eq!(completion.collisions(), 1);
    assert_eq!(writer.collisions(), 1);

    let clear = client
        .connection()
        .request(read_record(handle, 40, 2), None)
        .await
        .unwrap();
    assert_eq!(clear.collisions(), 0);

    drop(writer);
    let counts = daemon.dispatcher.outstanding().counts();
    assert_eq!(counts.write_collisions, 1);

    client.connection().shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn overlapping_reads_are_not_collisions() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let handle = client
        .create(&identity("READERS"), user_drive(256))
        .await
        .unwrap()
        .to_raw();

    let reader = daemon.dispatcher.outstanding().register(IoRequest {
        kind: RequestKind::Read,
        handle,
        io: BlockIo::new(0, 32, 520),
        side: Side::B,
        context: 7,
    });

    let completion = client
        .connection()
        .request(read_record(handle, 4, 4), None)
        .await
        .unwrap();
    assert_eq!(completion.collisions(), 0);
    assert_eq!(reader.collisions(), 0);
    assert_eq!(daemon.dispatcher.outstanding().counts().read_overlaps, 1);

    drop(reader);
    client.connection().shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn stale_handle_is_flagged_as_protocol_error() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let handle = client
        .create(&identity("STALE"), user_drive(16))
        .await
        .unwrap();
    client.remove(&identity("STALE")).await.unwrap();

    let pending = client
        .connection()
        .submit(read_record(handle.to_raw(), 0, 1), None)
        .await
        .unwrap();
    let completion = pending.response().await.unwrap();
    assert_eq!(completion.record.return_value, -3);
    assert_eq!(completion.collisions(), 1);

    client.connection().shutdown().await.unwrap();
    daemon.stop().await;
}
