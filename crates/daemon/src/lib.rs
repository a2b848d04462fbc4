// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vdisk-daemon: serves virtual disks over TCP
//!
//! The wire protocol lives here so the client crate speaks exactly what the
//! dispatcher parses.

pub mod collision;
pub mod config;
pub mod lifecycle;
pub mod protocol;
pub mod server;
pub mod worker;

pub use config::{Config, ConfigError};
pub use lifecycle::{startup, DaemonState, LifecycleError};
pub use protocol::{ProtocolError, RequestKind, Status, WireRecord};
pub use server::{Dispatcher, ServerError};
