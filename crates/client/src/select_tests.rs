// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use vdisk_core::{BlockIo, DiskSpec, DriveIdentity};
use yare::parameterized;

#[parameterized(
    memory = { "memory", BackendKind::InMemory },
    remote = { "remote:127.0.0.1:21075", BackendKind::Remote { addr: "127.0.0.1:21075".parse().unwrap() } },
    file = { "file:/tmp/drives", BackendKind::LocalFile { dir: "/tmp/drives".into() } },
)]
fn parse_backend_kind(input: &str, expected: BackendKind) {
    let kind: BackendKind = input.parse().unwrap();
    assert_eq!(kind, expected);
    assert_eq!(kind.to_string(), input);
}

#[parameterized(
    empty = { "" },
    unknown = { "tape" },
    bad_addr = { "remote:nowhere" },
    empty_dir = { "file:" },
)]
fn reject_bad_backend_kind(input: &str) {
    assert!(input.parse::<BackendKind>().is_err());
}

#[tokio::test]
async fn in_memory_backend_round_trips() {
    let backend = open_backend(&BackendKind::InMemory, ClientConfig::default())
        .await
        .unwrap();
    let identity = DriveIdentity::new("MEM").unwrap();
    let spec = DiskSpec {
        block_size: 520,
        capacity: 64,
        location: Default::default(),
    };
    let handle = backend.create(&identity, spec).await.unwrap();
    backend
        .write(handle, BlockIo::new(8, 1, 520), vec![0x42; 520])
        .await
        .unwrap();
    let outcome = backend.read(handle, BlockIo::new(8, 1, 520)).await.unwrap();
    assert_eq!(outcome.data, vec![0x42; 520]);
}

#[tokio::test]
async fn local_file_backend_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let kind = BackendKind::LocalFile {
        dir: dir.path().to_path_buf(),
    };
    let backend = open_backend(&kind, ClientConfig::default()).await.unwrap();
    let identity = DriveIdentity::new("FILE").unwrap();
    let spec = DiskSpec {
        block_size: 512,
        capacity: 64,
        location: Default::default(),
    };
    let handle = backend.create(&identity, spec).await.unwrap();
    backend
        .write(handle, BlockIo::new(3, 2, 512), vec![7; 1024])
        .await
        .unwrap();
    let outcome = backend.read(handle, BlockIo::new(3, 2, 512)).await.unwrap();
    assert_eq!(outcome.data, vec![7; 1024]);
}
