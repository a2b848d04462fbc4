// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_daemon::TestDaemon;
use std::time::Duration;

fn quick() -> ClientConfig {
    ClientConfig {
        connect_attempts: 2,
        connect_retry_interval: Duration::from_millis(10),
        shutdown_timeout: Duration::from_secs(2),
        max_transfer_unit: 1024,
    }
}

fn create(identity: &str) -> WireRecord {
    let mut record = WireRecord::new(RequestKind::Create);
    record.identity = identity.as_bytes().to_vec();
    record.block_size = 520;
    record.requested_capacity = 1000;
    record
}

fn write(handle: u64, lba: u64) -> WireRecord {
    let mut record = WireRecord::new(RequestKind::Write);
    record.handle = handle;
    record.lba = lba;
    record.block_size = 520;
    record
}

fn read(handle: u64, lba: u64, blocks: u64) -> WireRecord {
    let mut record = WireRecord::new(RequestKind::Read);
    record.handle = handle;
    record.lba = lba;
    record.block_size = 520;
    record.byte_length = blocks * 520;
    record
}

#[tokio::test]
async fn handshake_assigns_side_and_transfer_id() {
    let daemon = TestDaemon::start().await;
    let connection = Connection::connect(daemon.addr, quick()).await.unwrap();
    assert_eq!(connection.side(), 0);
    assert_ne!(connection.transfer_id(), 0);
    connection.shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn connect_gives_up_after_bounded_attempts() {
    // Bind then drop to find a port nothing listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let result = Connection::connect(addr, quick()).await;
    assert!(matches!(
        result,
        Err(ClientError::ConnectFailed { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn many_outstanding_requests_complete_by_id() {
    let daemon = TestDaemon::start().await;
    let connection = Connection::connect(daemon.addr, quick()).await.unwrap();
    let handle = connection.request(create("MUX"), None).await.unwrap().record.handle;

    let mut pending = Vec::new();
    for lba in 0..16u64 {
        let data = vec![lba as u8; 520];
        pending.push(connection.submit(write(handle, lba), Some(&data)).await.unwrap());
    }
    let ids: Vec<u64> = pending.iter().map(PendingRequest::id).collect();
    for (request, id) in pending.into_iter().zip(ids) {
        let completion = request.wait().await.unwrap();
        assert_eq!(completion.record.context, id);
    }

    let completion = connection.request(read(handle, 0, 16), None).await.unwrap();
    for (lba, block) in completion.data.chunks(520).enumerate() {
        assert!(block.iter().all(|&b| b == lba as u8));
    }

    connection.shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn read_payload_larger_than_transfer_unit() {
    let daemon = TestDaemon::start().await;
    let connection = Connection::connect(daemon.addr, quick()).await.unwrap();
    let handle = connection.request(create("BIG"), None).await.unwrap().record.handle;

    let data: Vec<u8> = (0..520 * 20).map(|i| (i % 251) as u8).collect();
    connection.request(write(handle, 0), Some(&data)).await.unwrap();
    let completion = connection.request(read(handle, 0, 20), None).await.unwrap();
    assert_eq!(completion.data, data);

    connection.shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn failure_status_is_rejected() {
    let daemon = TestDaemon::start().await;
    let connection = Connection::connect(daemon.addr, quick()).await.unwrap();

    let mut open = WireRecord::new(RequestKind::Open);
    open.identity = b"MISSING".to_vec();
    let result = connection.request(open, None).await;
    assert!(matches!(
        result,
        Err(ClientError::Rejected {
            status: Status::NotFound,
            code: -2
        })
    ));

    connection.shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn requests_fail_after_shutdown() {
    let daemon = TestDaemon::start().await;
    let connection = Connection::connect(daemon.addr, quick()).await.unwrap();
    connection.shutdown().await.unwrap();

    assert!(connection.is_closed());
    assert!(matches!(
        connection.submit(create("LATE"), None).await,
        Err(ClientError::Closed)
    ));
    daemon.stop().await;
}
