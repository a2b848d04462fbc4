// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend selection, made once at startup

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use vdisk_core::{
    DriveBackend, FillPolicy, InMemoryBackend, LocalFileBackend, Registry, RegistryOptions, Side,
    TracedBackend,
};

use crate::config::ClientConfig;
use crate::connection::ClientError;
use crate::remote::RemoteBackend;

/// Where drives live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// A registry inside this process
    InMemory,
    /// A daemon at `addr`
    Remote { addr: SocketAddr },
    /// One file per drive under `dir`
    LocalFile { dir: PathBuf },
}

#[derive(Debug, Error)]
#[error("invalid backend '{0}': expected memory, remote:<addr> or file:<dir>")]
pub struct ParseBackendError(String);

impl FromStr for BackendKind {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "memory" => Ok(Self::InMemory),
            Some(("remote", addr)) => addr
                .parse()
                .map(|addr| Self::Remote { addr })
                .map_err(|_| ParseBackendError(s.to_string())),
            Some(("file", dir)) if !dir.is_empty() => Ok(Self::LocalFile { dir: dir.into() }),
            _ => Err(ParseBackendError(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory => write!(f, "memory"),
            Self::Remote { addr } => write!(f, "remote:{addr}"),
            Self::LocalFile { dir } => write!(f, "file:{}", dir.display()),
        }
    }
}

/// Build the traced backend for `kind`.
pub async fn open_backend(
    kind: &BackendKind,
    config: ClientConfig,
) -> Result<Arc<dyn DriveBackend>, ClientError> {
    let backend: Arc<dyn DriveBackend> = match kind {
        BackendKind::InMemory => {
            let registry = Arc::new(Registry::new(RegistryOptions::default()));
            Arc::new(TracedBackend::new(InMemoryBackend::new(
                registry,
                Side::A,
                FillPolicy::default(),
            )))
        }
        BackendKind::Remote { addr } => Arc::new(TracedBackend::new(
            RemoteBackend::connect(*addr, config).await?,
        )),
        BackendKind::LocalFile { dir } => {
            Arc::new(TracedBackend::new(LocalFileBackend::new(dir.clone())))
        }
    };
    tracing::info!(backend = %kind, "backend selected");
    Ok(backend)
}

#[cfg(test)]
#[path = "select_tests.rs"]
mod tests;
