// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Virtual disk registry
//!
//! A fixed-capacity table of disks keyed by identity. Handles carry the slot
//! index and a generation so a handle to a removed disk never reaches a disk
//! created later in the same slot. Each entry records which sides (storage
//! processors) hold it open; the disk lives until both have removed it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::disk::{DiskSpec, DriveIdentity, VirtualDisk};
use crate::policy::BootstrapRegions;

/// Attaching storage processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Side::A),
            1 => Some(Side::B),
            _ => None,
        }
    }

    pub fn index(self) -> u32 {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "SPA"),
            Side::B => write!(f, "SPB"),
        }
    }
}

/// Registry slot plus generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriveHandle {
    slot: u32,
    generation: u32,
}

impl DriveHandle {
    /// Raw value meaning "no handle"
    pub const INVALID: u64 = u64::MAX;

    pub fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn to_raw(self) -> u64 {
        (self.generation as u64) << 32 | self.slot as u64
    }

    pub fn from_raw(raw: u64) -> Option<Self> {
        if raw == Self::INVALID {
            return None;
        }
        Some(Self {
            slot: raw as u32,
            generation: (raw >> 32) as u32,
        })
    }
}

impl fmt::Display for DriveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.slot, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry full ({capacity} drives)")]
    Full { capacity: usize },

    #[error("drive not found: {0}")]
    NotFound(DriveIdentity),

    #[error("invalid drive handle {0:#x}")]
    InvalidHandle(u64),

    #[error("stale drive handle {0:#x}")]
    StaleHandle(u64),
}

/// Settings applied to every disk the registry creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    pub capacity: usize,
    pub verify_compressed: bool,
    pub bootstrap: BootstrapRegions,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            capacity: 4096,
            verify_compressed: true,
            bootstrap: BootstrapRegions::default(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    disk: Arc<VirtualDisk>,
    sides: u8,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Debug, Default)]
struct Inner {
    slots: Vec<Slot>,
    by_identity: HashMap<DriveIdentity, u32>,
    free: Vec<u32>,
}

/// Table of live virtual disks
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<Inner>,
    options: RegistryOptions,
}

impl Registry {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            options,
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.inner().by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn new_disk(&self, identity: DriveIdentity, spec: DiskSpec) -> Arc<VirtualDisk> {
        let system_drive = self.options.bootstrap.is_system_drive(spec.location);
        Arc::new(VirtualDisk::new(
            identity,
            spec,
            system_drive,
            self.options.verify_compressed,
        ))
    }

    /// Create a disk, discarding any prior data under the same identity.
    pub fn create(
        &self,
        identity: DriveIdentity,
        spec: DiskSpec,
        side: Side,
    ) -> Result<(DriveHandle, Arc<VirtualDisk>), RegistryError> {
        let mut inner = self.inner();
        let sides = match inner.by_identity.get(&identity).copied() {
            Some(slot) => {
                let previous = inner.release(slot);
                if let Some(old) = &previous {
                    old.disk.destroy();
                }
                previous.map_or(0, |e| e.sides)
            }
            None => 0,
        };
        let disk = self.new_disk(identity.clone(), spec);
        let handle = inner.place(
            identity.clone(),
            Entry {
                disk: Arc::clone(&disk),
                sides: sides | side.bit(),
            },
            self.options.capacity,
        )?;
        info!(
            disk = %identity,
            %handle,
            %side,
            block_size = spec.block_size,
            capacity = spec.capacity,
            "drive created"
        );
        Ok((handle, disk))
    }

    /// Open an existing disk.
    pub fn open(
        &self,
        identity: &DriveIdentity,
        side: Side,
    ) -> Result<(DriveHandle, Arc<VirtualDisk>), RegistryError> {
        let mut inner = self.inner();
        let slot = *inner
            .by_identity
            .get(identity)
            .ok_or_else(|| RegistryError::NotFound(identity.clone()))?;
        inner.attach(slot, side)
    }

    /// Open a disk, creating it with `spec` if it does not exist yet.
    pub fn open_or_create(
        &self,
        identity: &DriveIdentity,
        spec: DiskSpec,
        side: Side,
    ) -> Result<(DriveHandle, Arc<VirtualDisk>), RegistryError> {
        let mut inner = self.inner();
        if let Some(slot) = inner.by_identity.get(identity).copied() {
            return inner.attach(slot, side);
        }
        let disk = self.new_disk(identity.clone(), spec);
        let handle = inner.place(
            identity.clone(),
            Entry {
                disk: Arc::clone(&disk),
                sides: side.bit(),
            },
            self.options.capacity,
        )?;
        info!(disk = %identity, %handle, %side, "drive created on first reference");
        Ok((handle, disk))
    }

    /// Resolve a handle to its disk.
    pub fn get(&self, handle: DriveHandle) -> Result<Arc<VirtualDisk>, RegistryError> {
        let inner = self.inner();
        let raw = handle.to_raw();
        let slot = inner
            .slots
            .get(handle.slot as usize)
            .ok_or(RegistryError::InvalidHandle(raw))?;
        match &slot.entry {
            Some(entry) if slot.generation == handle.generation => Ok(Arc::clone(&entry.disk)),
            _ => Err(RegistryError::StaleHandle(raw)),
        }
    }

    /// Resolve a raw wire handle.
    pub fn get_raw(&self, raw: u64) -> Result<Arc<VirtualDisk>, RegistryError> {
        let handle = DriveHandle::from_raw(raw).ok_or(RegistryError::InvalidHandle(raw))?;
        if handle.slot as usize >= self.options.capacity {
            return Err(RegistryError::InvalidHandle(raw));
        }
        self.get(handle)
    }

    /// Drop `side`'s reference. Returns `true` when the disk was destroyed.
    pub fn remove(&self, identity: &DriveIdentity, side: Side) -> Result<bool, RegistryError> {
        let mut inner = self.inner();
        let slot = *inner
            .by_identity
            .get(identity)
            .ok_or_else(|| RegistryError::NotFound(identity.clone()))?;
        let remaining = match inner.slots[slot as usize].entry.as_mut() {
            Some(entry) => {
                entry.sides &= !side.bit();
                entry.sides
            }
            None => 0,
        };
        if remaining != 0 {
            info!(disk = %identity, %side, "drive released, still referenced");
            return Ok(false);
        }
        if let Some(entry) = inner.release(slot) {
            entry.disk.destroy();
        }
        Ok(true)
    }

    /// Destroy every disk regardless of references. Returns the count.
    pub fn remove_all(&self) -> usize {
        let mut inner = self.inner();
        let slots: Vec<u32> = inner.by_identity.values().copied().collect();
        let mut removed = 0;
        for slot in slots {
            if let Some(entry) = inner.release(slot) {
                entry.disk.destroy();
                removed += 1;
            }
        }
        if removed > 0 {
            warn!(removed, "all drives removed");
        }
        removed
    }
}

impl Inner {
    fn attach(
        &mut self,
        slot: u32,
        side: Side,
    ) -> Result<(DriveHandle, Arc<VirtualDisk>), RegistryError> {
        let entry_slot = &mut self.slots[slot as usize];
        let generation = entry_slot.generation;
        match entry_slot.entry.as_mut() {
            Some(entry) => {
                entry.sides |= side.bit();
                Ok((DriveHandle::new(slot, generation), Arc::clone(&entry.disk)))
            }
            None => Err(RegistryError::StaleHandle(
                DriveHandle::new(slot, generation).to_raw(),
            )),
        }
    }

    fn place(
        &mut self,
        identity: DriveIdentity,
        entry: Entry,
        capacity: usize,
    ) -> Result<DriveHandle, RegistryError> {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None if self.slots.len() < capacity => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
            None => return Err(RegistryError::Full { capacity }),
        };
        let target = &mut self.slots[slot as usize];
        target.entry = Some(entry);
        self.by_identity.insert(identity, slot);
        Ok(DriveHandle::new(slot, target.generation))
    }

    fn release(&mut self, slot: u32) -> Option<Entry> {
        let target = self.slots.get_mut(slot as usize)?;
        let entry = target.entry.take()?;
        target.generation = target.generation.wrapping_add(1);
        self.by_identity.remove(entry.disk.identity());
        self.free.push(slot);
        Some(entry)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
