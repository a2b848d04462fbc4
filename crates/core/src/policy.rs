// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fallback rendering for LBAs no record covers

use serde::{Deserialize, Serialize};

use crate::pattern::DriveLocation;

/// What a read of never-written, non-bootstrap LBAs returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnwrittenRead {
    /// Fail the read with an integrity error
    Error,
    /// Render the zero pattern and log a warning
    #[default]
    ZeroFill,
}

/// Regions that are read before anything writes them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapRegions {
    pub max_bus: u16,
    pub max_enclosure: u16,
    pub max_slot: u16,
    /// LBAs below this limit on a system drive are bootstrap reads
    pub system_lba_limit: u64,
    /// LBAs below this count are bootstrap reads on every drive
    pub leading_blocks: u64,
}

impl Default for BootstrapRegions {
    fn default() -> Self {
        Self {
            max_bus: 0,
            max_enclosure: 0,
            max_slot: 3,
            system_lba_limit: 0x10000,
            leading_blocks: 1,
        }
    }
}

impl BootstrapRegions {
    pub fn is_system_drive(&self, location: DriveLocation) -> bool {
        location.bus <= self.max_bus
            && location.enclosure <= self.max_enclosure
            && location.slot <= self.max_slot
    }

    pub fn covers(&self, location: DriveLocation, lba: u64) -> bool {
        lba < self.leading_blocks
            || (self.is_system_drive(location) && lba < self.system_lba_limit)
    }
}

/// Complete fallback policy applied by reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillPolicy {
    pub bootstrap: BootstrapRegions,
    pub unwritten: UnwrittenRead,
}

impl FillPolicy {
    /// Strict policy: no zero fill for user space
    pub fn strict() -> Self {
        Self {
            bootstrap: BootstrapRegions::default(),
            unwritten: UnwrittenRead::Error,
        }
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
