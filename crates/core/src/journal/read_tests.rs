// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::codec::{encode, BLOCK_UNIT, COMPRESSED_UNIT};
use crate::pattern::{
    bootstrap_word, DriveLocation, EncryptionKey, SECTOR_PAYLOAD, SECTOR_SIZE, ZERO_METADATA,
};
use crate::policy::FillPolicy;

const BS: u32 = SECTOR_SIZE as u32;

fn user_drive() -> DriveLocation {
    DriveLocation::new(1, 0, 10)
}

fn compressible_unit(seed: u64) -> Vec<u8> {
    let mut block = Vec::with_capacity(BLOCK_UNIT);
    for i in 0..(BLOCK_UNIT / 8) as u64 {
        let word = if i < 100 { seed } else { 0 };
        block.extend_from_slice(&word.to_le_bytes());
    }
    block
}

#[test]
fn unmapped_zero_read_has_no_checksum_and_reports_flag() {
    let mut journal = Journal::default();
    journal.write_zero_pattern(0, 4, BS, None, true).unwrap();

    let out = journal
        .read(0, 4, BS, user_drive(), &FillPolicy::strict())
        .unwrap();
    assert!(out.unmapped);
    assert!(!out.compressed);
    assert!(out.data.iter().all(|&b| b == 0));
}

#[test]
fn mapped_zero_read_carries_checksum() {
    let mut journal = Journal::default();
    journal.write_zero_pattern(0, 1, BS, None, false).unwrap();

    let out = journal
        .read(0, 1, BS, user_drive(), &FillPolicy::strict())
        .unwrap();
    assert!(!out.unmapped);
    assert_eq!(&out.data[SECTOR_PAYLOAD..], &ZERO_METADATA.to_le_bytes());
}

#[test]
fn keyed_zero_read_is_transformed() {
    let key = EncryptionKey::new(vec![0x5Au8; 20]).unwrap();
    let mut journal = Journal::default();
    journal.write_zero_pattern(0, 1, BS, Some(&key), false).unwrap();

    let out = journal
        .read(0, 1, BS, user_drive(), &FillPolicy::strict())
        .unwrap();
    assert!(out.data[..SECTOR_PAYLOAD].iter().all(|&b| b == 0x5A));
    assert_eq!(out.data[SECTOR_PAYLOAD], !0xED);
}

#[test]
fn unwritten_user_read_is_an_integrity_error_when_strict() {
    let mut journal = Journal::default();
    journal.write(10, 1, BS, &vec![1u8; SECTOR_SIZE]).unwrap();

    let err = journal
        .read(10, 3, BS, user_drive(), &FillPolicy::strict())
        .unwrap_err();
    assert_eq!(err, JournalError::UnwrittenRead { lba: 11 });
}

#[test]
fn unwritten_user_read_zero_fills_by_default() {
    let journal = Journal::default();
    let out = journal
        .read(10, 2, BS, user_drive(), &FillPolicy::default())
        .unwrap();
    for sector in out.data.chunks_exact(SECTOR_SIZE) {
        assert!(sector[..SECTOR_PAYLOAD].iter().all(|&b| b == 0));
        assert_eq!(&sector[SECTOR_PAYLOAD..], &ZERO_METADATA.to_le_bytes());
    }
}

#[test]
fn bootstrap_reads_use_filler_even_when_strict() {
    let journal = Journal::default();
    let system = DriveLocation::new(0, 0, 1);

    let out = journal
        .read(42, 1, BS, system, &FillPolicy::strict())
        .unwrap();
    assert_eq!(&out.data[..8], &bootstrap_word(system, 42).to_le_bytes());

    // Leading block on a user drive
    let out = journal
        .read(0, 1, BS, user_drive(), &FillPolicy::strict())
        .unwrap();
    assert_eq!(&out.data[..8], &bootstrap_word(user_drive(), 0).to_le_bytes());
}

#[test]
fn compressed_record_passes_through_at_native_block_size() {
    let unit = encode(&compressible_unit(0xABCD)).unwrap();
    let mut stored = unit.to_vec();
    stored.extend_from_slice(&unit);

    let mut journal = Journal::default();
    journal.write(0, 2, BLOCK_UNIT as u32, &stored).unwrap();

    let out = journal
        .read(0, 2, BLOCK_UNIT as u32, user_drive(), &FillPolicy::strict())
        .unwrap();
    assert!(out.compressed);
    assert_eq!(out.data.len(), 2 * COMPRESSED_UNIT);
    assert_eq!(out.data, stored);
}

#[test]
fn partially_covered_compressed_read_decodes() {
    let block = compressible_unit(0x77);
    let unit = encode(&block).unwrap();

    let mut journal = Journal::default();
    journal.write(1, 1, BLOCK_UNIT as u32, &unit).unwrap();

    // LBA 2 is uncovered, so the range cannot pass through
    let out = journal
        .read(1, 2, BLOCK_UNIT as u32, user_drive(), &FillPolicy::default())
        .unwrap();
    assert!(!out.compressed);
    assert_eq!(out.data.len(), 2 * BLOCK_UNIT);
    assert_eq!(&out.data[..BLOCK_UNIT], block.as_slice());
}

#[test]
fn read_at_other_block_size_copies_overlap() {
    let mut journal = Journal::default();
    journal.write(5, 1, 512, &[0x3Cu8; 512]).unwrap();

    let out = journal
        .read(5, 1, BS, user_drive(), &FillPolicy::strict())
        .unwrap();
    assert!(out.data[..512].iter().all(|&b| b == 0x3C));
    assert!(out.data[512..].iter().all(|&b| b == 0));
}

#[test]
fn read_spanning_records_and_gaps_stitches_in_order() {
    let mut journal = Journal::default();
    journal.write(2, 1, BS, &vec![0x22u8; SECTOR_SIZE]).unwrap();
    journal.write_zero_pattern(3, 1, BS, None, false).unwrap();
    journal.write(5, 1, BS, &vec![0x55u8; SECTOR_SIZE]).unwrap();

    let out = journal
        .read(2, 4, BS, user_drive(), &FillPolicy::default())
        .unwrap();
    assert_eq!(out.data[0], 0x22);
    assert_eq!(out.data[SECTOR_SIZE], 0);
    assert_eq!(out.data[2 * SECTOR_SIZE], 0);
    assert_eq!(out.data[3 * SECTOR_SIZE], 0x55);
}
