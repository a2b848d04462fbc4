// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drive commands

use std::fmt;

use anyhow::{bail, Context};
use clap::Subcommand;
use serde::Serialize;
use vdisk_core::codec::{self, BLOCK_UNIT};
use vdisk_core::{
    BlockIo, DiskSpec, DriveBackend, DriveHandle, DriveIdentity, DriveInfo, DriveLocation,
    EncryptionKey, ZeroOptions,
};

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum DriveCommand {
    /// Create a drive, discarding any data under the same identity
    Create {
        identity: String,
        #[arg(long, default_value_t = 520)]
        block_size: u32,
        /// Addressable blocks
        #[arg(long, default_value_t = 0x0100_0000)]
        capacity: u64,
        /// Physical position as bus_enclosure_slot
        #[arg(long, value_parser = parse_location)]
        location: Option<DriveLocation>,
    },
    /// Check that a drive exists
    Open { identity: String },
    /// Release a drive
    Remove { identity: String },
    /// Destroy every drive
    RemoveAll,
    /// Dump blocks as hex
    Read {
        identity: String,
        #[arg(long)]
        lba: u64,
        #[arg(long, default_value_t = 1)]
        blocks: u64,
    },
    /// Fill blocks with one byte value
    Write {
        identity: String,
        #[arg(long)]
        lba: u64,
        #[arg(long, default_value_t = 1)]
        blocks: u64,
        #[arg(long, value_parser = parse_u8)]
        fill: u8,
    },
    /// Write the zero pattern
    Zero {
        identity: String,
        #[arg(long)]
        lba: u64,
        #[arg(long, default_value_t = 1)]
        blocks: u64,
        /// Render metadata as unmapped
        #[arg(long)]
        unmapped: bool,
        /// Encryption key as hex (16 to 32 bytes)
        #[arg(long)]
        key: Option<String>,
    },
    /// Set the per-drive trace bitmask
    Debug {
        identity: String,
        #[arg(value_parser = parse_u32)]
        flags: u32,
    },
    /// Show record and allocation counts
    Info { identity: String },
    /// Show the serving process id
    Pid,
}

#[derive(Serialize)]
struct InfoView {
    identity: String,
    handle: String,
    #[serde(flatten)]
    info: DriveInfo,
}

impl fmt::Display for InfoView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "drive:      {}", self.identity)?;
        writeln!(f, "handle:     {}", self.handle)?;
        writeln!(f, "block size: {}", self.info.block_size)?;
        writeln!(f, "capacity:   {}", self.info.capacity)?;
        writeln!(f, "records:    {}", self.info.records)?;
        write!(f, "allocated:  {} bytes", self.info.bytes_allocated)
    }
}

pub async fn handle(
    command: DriveCommand,
    backend: &dyn DriveBackend,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        DriveCommand::Create {
            identity,
            block_size,
            capacity,
            location,
        } => {
            let spec = DiskSpec {
                block_size,
                capacity,
                location: location.unwrap_or_default(),
            };
            let handle = backend.create(&parse_identity(&identity)?, spec).await?;
            println!("Created {} (handle {})", identity, handle);
        }
        DriveCommand::Open { identity } => {
            let handle = backend.open(&parse_identity(&identity)?).await?;
            println!("Opened {} (handle {})", identity, handle);
        }
        DriveCommand::Remove { identity } => {
            backend.remove(&parse_identity(&identity)?).await?;
            println!("Removed {}", identity);
        }
        DriveCommand::RemoveAll => {
            backend.remove_all().await?;
            println!("Removed all drives");
        }
        DriveCommand::Read {
            identity,
            lba,
            blocks,
        } => {
            let (handle, info) = open_with_info(backend, &identity).await?;
            let outcome = backend
                .read(handle, BlockIo::new(lba, blocks, info.block_size))
                .await?;
            if outcome.unmapped {
                println!("(unmapped)");
            }
            if outcome.compressed {
                println!("(compressed)");
            }
            let base = lba.saturating_mul(u64::from(info.block_size));
            print!("{}", output::hex_dump(&outcome.data, base));
        }
        DriveCommand::Write {
            identity,
            lba,
            blocks,
            fill,
        } => {
            let (handle, info) = open_with_info(backend, &identity).await?;
            let pattern = fill_block(info.block_size, fill)?;
            backend
                .write_same(
                    handle,
                    BlockIo::new(lba, blocks, info.block_size),
                    pattern,
                    ZeroOptions::default(),
                )
                .await?;
            println!("Wrote {} blocks at {}", blocks, lba);
        }
        DriveCommand::Zero {
            identity,
            lba,
            blocks,
            unmapped,
            key,
        } => {
            let key = key.as_deref().map(parse_key).transpose()?;
            let (handle, info) = open_with_info(backend, &identity).await?;
            let pattern = fill_block(info.block_size, 0)?;
            backend
                .write_same(
                    handle,
                    BlockIo::new(lba, blocks, info.block_size),
                    pattern,
                    ZeroOptions { key, unmapped },
                )
                .await?;
            println!("Zeroed {} blocks at {}", blocks, lba);
        }
        DriveCommand::Debug { identity, flags } => {
            let handle = backend.open(&parse_identity(&identity)?).await?;
            backend.set_debug_flags(handle, flags).await?;
            println!("Debug flags for {} set to {:#x}", identity, flags);
        }
        DriveCommand::Info { identity } => {
            let (handle, info) = open_with_info(backend, &identity).await?;
            let view = InfoView {
                identity,
                handle: handle.to_string(),
                info,
            };
            output::print(&view, format);
        }
        DriveCommand::Pid => {
            println!("{}", backend.server_pid().await?);
        }
    }
    Ok(())
}

async fn open_with_info(
    backend: &dyn DriveBackend,
    identity: &str,
) -> anyhow::Result<(DriveHandle, DriveInfo)> {
    let handle = backend
        .open(&parse_identity(identity)?)
        .await
        .with_context(|| format!("drive {} not found", identity))?;
    let info = backend.drive_info(handle).await?;
    Ok((handle, info))
}

/// One block of `byte` in stored form.
fn fill_block(block_size: u32, byte: u8) -> anyhow::Result<Vec<u8>> {
    if !codec::is_compressed_block_size(block_size) {
        return Ok(vec![byte; block_size as usize]);
    }
    let unit = vec![byte; BLOCK_UNIT];
    let Some(encoded) = codec::encode(&unit) else {
        bail!("fill pattern does not compress");
    };
    let units = block_size as usize / BLOCK_UNIT;
    Ok(encoded.repeat(units))
}

fn parse_identity(identity: &str) -> anyhow::Result<DriveIdentity> {
    DriveIdentity::new(identity).with_context(|| format!("invalid drive identity '{}'", identity))
}

fn parse_key(hex: &str) -> anyhow::Result<EncryptionKey> {
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        bail!("key must be an even number of hex digits");
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .context("key is not hex")?;
    Ok(EncryptionKey::new(bytes)?)
}

fn parse_location(s: &str) -> Result<DriveLocation, String> {
    let parts: Vec<&str> = s.split('_').collect();
    let [bus, enclosure, slot] = parts.as_slice() else {
        return Err(format!("expected bus_enclosure_slot, got '{}'", s));
    };
    let field = |v: &str| v.parse::<u16>().map_err(|e| format!("'{}': {}", v, e));
    Ok(DriveLocation::new(
        field(*bus)?,
        field(*enclosure)?,
        field(*slot)?,
    ))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| e.to_string())
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let value = parse_u32(s)?;
    u8::try_from(value).map_err(|_| format!("{} does not fit in a byte", s))
}

#[cfg(test)]
#[path = "drive_tests.rs"]
mod tests;
