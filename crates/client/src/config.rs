// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client settings (env vars in milliseconds)

use std::time::Duration;

use vdisk_daemon::protocol::DEFAULT_MAX_TRANSFER;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn parse_count(var: &str) -> Option<u32> {
    std::env::var(var).ok().and_then(|s| s.parse::<u32>().ok())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Connect attempts before giving up
    pub connect_attempts: u32,
    pub connect_retry_interval: Duration,
    /// Bound on the CLEANUP exchange and receiver exit
    pub shutdown_timeout: Duration,
    /// Largest chunk per socket send or receive
    pub max_transfer_unit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            connect_retry_interval: Duration::from_millis(200),
            shutdown_timeout: Duration::from_secs(10),
            max_transfer_unit: DEFAULT_MAX_TRANSFER,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `VDISK_CONNECT_ATTEMPTS`,
    /// `VDISK_RETRY_INTERVAL_MS` and `VDISK_SHUTDOWN_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            connect_attempts: parse_count("VDISK_CONNECT_ATTEMPTS")
                .unwrap_or(defaults.connect_attempts)
                .max(1),
            connect_retry_interval: parse_duration_ms("VDISK_RETRY_INTERVAL_MS")
                .unwrap_or(defaults.connect_retry_interval),
            shutdown_timeout: parse_duration_ms("VDISK_SHUTDOWN_TIMEOUT_MS")
                .unwrap_or(defaults.shutdown_timeout),
            max_transfer_unit: defaults.max_transfer_unit,
        }
    }
}
