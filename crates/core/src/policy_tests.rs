// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    system_low_lba = { 0, 0, 3, 100, true },
    system_limit = { 0, 0, 3, 0x10000, false },
    user_slot_low_lba = { 0, 0, 4, 100, false },
    user_leading_block = { 1, 2, 7, 0, true },
    other_bus = { 1, 0, 0, 5, false },
)]
fn bootstrap_region_coverage(bus: u16, enclosure: u16, slot: u16, lba: u64, covered: bool) {
    let regions = BootstrapRegions::default();
    let location = DriveLocation::new(bus, enclosure, slot);
    assert_eq!(regions.covers(location, lba), covered);
}

#[test]
fn unwritten_read_policy_deserializes_snake_case() {
    #[derive(Deserialize)]
    struct Wrapper {
        policy: UnwrittenRead,
    }
    let parsed: Wrapper = toml::from_str("policy = \"zero_fill\"").unwrap();
    assert_eq!(parsed.policy, UnwrittenRead::ZeroFill);
    let parsed: Wrapper = toml::from_str("policy = \"error\"").unwrap();
    assert_eq!(parsed.policy, UnwrittenRead::Error);
}

#[test]
fn default_policy_zero_fills() {
    assert_eq!(FillPolicy::default().unwritten, UnwrittenRead::ZeroFill);
    assert_eq!(FillPolicy::strict().unwritten, UnwrittenRead::Error);
}
