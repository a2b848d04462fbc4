//! Shared helpers for specs

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use vdisk_client::{ClientConfig, RemoteBackend};
use vdisk_core::{DiskSpec, DriveIdentity, DriveLocation};
use vdisk_daemon::{Config, Dispatcher, LifecycleError};

/// A daemon serving on an ephemeral port until stopped
pub struct Daemon {
    pub addr: SocketAddr,
    pub dispatcher: Arc<Dispatcher>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), LifecycleError>>,
}

impl Daemon {
    pub async fn start() -> Self {
        Self::start_with(Config::default()).await
    }

    pub async fn start_with(config: Config) -> Self {
        let config = Config { port: 0, ..config };
        let daemon = vdisk_daemon::startup(&config).await.unwrap();
        let addr = daemon.local_addr().unwrap();
        let dispatcher = Arc::clone(daemon.dispatcher());
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(daemon.serve(async {
            let _ = stopped.await;
        }));
        Self {
            addr,
            dispatcher,
            stop: Some(stop),
            task,
        }
    }

    pub async fn client(&self) -> RemoteBackend {
        RemoteBackend::connect(self.addr, client_config()).await.unwrap()
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.task).await.unwrap().unwrap();
    }
}

pub fn client_config() -> ClientConfig {
    ClientConfig {
        connect_attempts: 3,
        connect_retry_interval: Duration::from_millis(20),
        shutdown_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    }
}

pub fn identity(name: &str) -> DriveIdentity {
    DriveIdentity::new(name).unwrap()
}

/// 520-byte-sector drive at a user slot
pub fn user_drive(capacity: u64) -> DiskSpec {
    DiskSpec {
        block_size: 520,
        capacity,
        location: DriveLocation::new(1, 0, 10),
    }
}
