// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration
//!
//! Defaults, then the TOML file named by `VDISK_CONFIG`, then the first
//! positional argument as the listen port.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vdisk_core::{BootstrapRegions, FillPolicy, RegistryOptions, UnwrittenRead};

use crate::protocol::DEFAULT_MAX_TRANSFER;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "VDISK_CONFIG";

/// Default listen port
pub const DEFAULT_PORT: u16 = 0x5253;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Invalid config {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Invalid port argument: {0}")]
    InvalidPort(String),
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen port, `0` picks an ephemeral port
    pub port: u16,
    pub bind_address: IpAddr,
    /// Connections accepted at once, one per storage processor
    pub max_connections: usize,
    /// Registry capacity
    pub max_drives: usize,
    /// Largest chunk moved per socket send or receive
    pub max_transfer_unit: usize,
    pub unwritten_read: UnwrittenRead,
    pub verify_compressed: bool,
    pub bootstrap: BootstrapRegions,
    /// Log file; stderr when unset
    pub log_path: Option<PathBuf>,
    /// Block size of drives created by a data request
    pub default_block_size: u32,
    /// Capacity of drives created by a data request
    pub default_max_lba: u64,
    /// Bound on receiving a request payload
    #[serde(with = "humantime_serde")]
    pub payload_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            max_connections: 2,
            max_drives: 4096,
            max_transfer_unit: DEFAULT_MAX_TRANSFER,
            unwritten_read: UnwrittenRead::default(),
            verify_compressed: true,
            bootstrap: BootstrapRegions::default(),
            log_path: None,
            default_block_size: 520,
            default_max_lba: 0x0100_0000,
            payload_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Build the configuration from the environment and process arguments.
    pub fn load(args: &[String]) -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(port) = args.get(1) {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            capacity: self.max_drives,
            verify_compressed: self.verify_compressed,
            bootstrap: self.bootstrap,
        }
    }

    pub fn fill_policy(&self) -> FillPolicy {
        FillPolicy {
            bootstrap: self.bootstrap,
            unwritten: self.unwritten_read,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
