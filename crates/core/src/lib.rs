// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vdisk-core: journaled virtual disks
//!
//! This crate provides:
//! - The compressed-block codec and synthesized sector patterns
//! - The per-disk journal record store (merge, split, read reconstruction)
//! - Virtual disks and the registry that maps identities to them
//! - The drive backend trait with in-memory, file and traced implementations

pub mod codec;
pub mod pattern;
pub mod policy;

pub mod journal;

pub mod disk;
pub mod registry;

pub mod backend;

// Re-exports
pub use backend::{
    BackendError, BlockIo, DriveBackend, InMemoryBackend, LocalFileBackend, TracedBackend,
    ZeroOptions,
};
pub use codec::CodecError;
pub use disk::{debug_flags, DiskSpec, DriveIdentity, DriveInfo, IdentityError, VirtualDisk};
pub use journal::{Journal, JournalError, JournalStats, ReadOutcome};
pub use pattern::{DriveLocation, EncryptionKey, KeyLengthError};
pub use policy::{BootstrapRegions, FillPolicy, UnwrittenRead};
pub use registry::{DriveHandle, Registry, RegistryError, RegistryOptions, Side};
