// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! vdisk - virtual disk diagnostics CLI

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use commands::drive::{self, DriveCommand};
use vdisk_client::{open_backend, BackendKind, ClientConfig};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "vdisk", version, about = "Inspect and drive virtual disks")]
struct Cli {
    /// Backend: memory, remote:<addr> or file:<dir>
    #[arg(long, global = true, default_value = "remote:127.0.0.1:21075")]
    backend: BackendKind,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: DriveCommand,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let backend = open_backend(&cli.backend, ClientConfig::from_env()).await?;
    drive::handle(cli.command, backend.as_ref(), cli.format).await
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
