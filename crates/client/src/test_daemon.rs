// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process daemon for client tests

use std::net::SocketAddr;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use vdisk_daemon::{Config, LifecycleError};

pub struct TestDaemon {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), LifecycleError>>,
}

impl TestDaemon {
    pub async fn start() -> Self {
        Self::with_config(Config {
            port: 0,
            ..Config::default()
        })
        .await
    }

    pub async fn with_config(config: Config) -> Self {
        let daemon = vdisk_daemon::startup(&config).await.unwrap();
        let addr = daemon.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(daemon.serve(async {
            let _ = stopped.await;
        }));
        Self {
            addr,
            stop: Some(stop),
            task,
        }
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.task).await.unwrap().unwrap();
    }
}
