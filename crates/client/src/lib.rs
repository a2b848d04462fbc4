// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vdisk-client: talks to a vdisk daemon
//!
//! [`Connection`] multiplexes requests over one socket; [`RemoteBackend`]
//! exposes it as a [`vdisk_core::DriveBackend`]; [`open_backend`] picks a
//! backend once at startup.

pub mod config;
pub mod connection;
pub mod remote;
pub mod select;

#[cfg(test)]
mod test_daemon;

pub use config::ClientConfig;
pub use connection::{ClientError, Completion, Connection, PendingRequest};
pub use remote::RemoteBackend;
pub use select::{open_backend, BackendKind, ParseBackendError};
