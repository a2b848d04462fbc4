// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request multiplexer over one daemon connection.
//!
//! Any number of requests may be outstanding. Sends are serialized by a lock
//! over the write half so a record and its payload never interleave with
//! another request's. One background task reads responses in wire order and
//! completes the waiting request by the id echoed in `context`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vdisk_daemon::protocol::{self, ProtocolError, RequestKind, Status, WireRecord};

use crate::config::ClientConfig;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to {addr} after {attempts} attempts: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Connection closed")]
    Closed,

    #[error("Request rejected with status {status:?} ({code})")]
    Rejected { status: Status, code: i64 },

    #[error("Shutdown timed out")]
    ShutdownTimeout,

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,
}

/// A finished request: the response record plus any read payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub record: WireRecord,
    pub data: Vec<u8>,
}

impl Completion {
    /// Suspect answers carry a non-zero collision count.
    pub fn collisions(&self) -> u32 {
        self.record.collision_count
    }
}

type Waiters = HashMap<u64, oneshot::Sender<Completion>>;

#[derive(Default)]
struct Pending {
    waiters: Mutex<Waiters>,
    closed: AtomicBool,
}

impl Pending {
    fn waiters(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail every outstanding request by dropping its sender.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let dropped = std::mem::take(&mut *self.waiters());
        if !dropped.is_empty() {
            warn!(outstanding = dropped.len(), "connection lost with requests in flight");
        }
    }
}

/// A request that has been sent and awaits its response
#[must_use]
pub struct PendingRequest {
    id: u64,
    rx: oneshot::Receiver<Completion>,
}

impl PendingRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the raw response, whatever its status.
    pub async fn response(self) -> Result<Completion, ClientError> {
        self.rx.await.map_err(|_| ClientError::Closed)
    }

    /// Wait for a successful response.
    pub async fn wait(self) -> Result<Completion, ClientError> {
        let completion = self.response().await?;
        match completion.record.status() {
            Status::Ok => Ok(completion),
            status => Err(ClientError::Rejected {
                status,
                code: completion.record.return_value,
            }),
        }
    }
}

/// One multiplexed connection to a daemon
pub struct Connection {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Arc<Pending>,
    next_id: AtomicU64,
    receiver: Mutex<Option<JoinHandle<()>>>,
    config: ClientConfig,
    side: u32,
    transfer_id: u64,
}

impl Connection {
    /// Connect, retrying a bounded number of times, and run the INIT handshake.
    pub async fn connect(addr: SocketAddr, config: ClientConfig) -> Result<Self, ClientError> {
        let stream = connect_with_retry(addr, &config).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        let (reader, writer) = stream.into_split();

        let pending = Arc::new(Pending::default());
        let receiver = tokio::spawn(receive_loop(
            reader,
            Arc::clone(&pending),
            config.max_transfer_unit,
        ));

        let mut connection = Self {
            writer: tokio::sync::Mutex::new(writer),
            pending,
            next_id: AtomicU64::new(1),
            receiver: Mutex::new(Some(receiver)),
            config,
            side: 0,
            transfer_id: 0,
        };

        let init = connection
            .request(WireRecord::new(RequestKind::Init), None)
            .await?;
        connection.side = init.record.side;
        connection.transfer_id = init.record.transfer_id;
        info!(
            %addr,
            side = connection.side,
            transfer_id = connection.transfer_id,
            "connected to daemon"
        );
        Ok(connection)
    }

    /// Side the daemon assigned to this connection
    pub fn side(&self) -> u32 {
        self.side
    }

    pub fn transfer_id(&self) -> u64 {
        self.transfer_id
    }

    pub fn is_closed(&self) -> bool {
        self.pending.closed.load(Ordering::SeqCst)
    }

    /// Send a request and return without waiting for its response.
    pub async fn submit(
        &self,
        mut record: WireRecord,
        payload: Option<&[u8]>,
    ) -> Result<PendingRequest, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        record.context = id;
        if let Some(payload) = payload {
            record.byte_length = payload.len() as u64;
        }

        // Register before sending so the response cannot outrun the waiter.
        let (tx, rx) = oneshot::channel();
        self.pending.waiters().insert(id, tx);

        let sent = {
            let mut writer = self.writer.lock().await;
            match protocol::write_record(&mut *writer, &record).await {
                Ok(()) => match payload {
                    Some(data) => {
                        protocol::write_payload(&mut *writer, data, self.config.max_transfer_unit)
                            .await
                    }
                    None => Ok(()),
                },
                Err(e) => Err(e),
            }
        };
        if let Err(e) = sent {
            self.pending.waiters().remove(&id);
            warn!(id, kind = ?record.kind, "Failed to send request: {}", e);
            self.pending.close();
            return Err(e.into());
        }
        Ok(PendingRequest { id, rx })
    }

    /// Send a request and wait for a successful response.
    pub async fn request(
        &self,
        record: WireRecord,
        payload: Option<&[u8]>,
    ) -> Result<Completion, ClientError> {
        self.submit(record, payload).await?.wait().await
    }

    /// Send CLEANUP and stop the receiver, force-closing if it lingers.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let timeout = self.config.shutdown_timeout;
        let cleanup = async {
            if !self.is_closed() {
                self.request(WireRecord::new(RequestKind::Cleanup), None)
                    .await?;
            }
            Ok::<(), ClientError>(())
        };
        let result = match tokio::time::timeout(timeout, cleanup).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::ShutdownTimeout),
        };

        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut receiver) = receiver {
            if tokio::time::timeout(timeout, &mut receiver).await.is_err() {
                warn!("receiver did not exit, closing connection");
                receiver.abort();
            }
        }
        self.pending.close();
        result
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(receiver) = self
            .receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            receiver.abort();
        }
    }
}

async fn connect_with_retry(
    addr: SocketAddr,
    config: &ClientConfig,
) -> Result<TcpStream, ClientError> {
    let attempts = config.connect_attempts.max(1);
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(source) if attempt >= attempts => {
                return Err(ClientError::ConnectFailed {
                    addr,
                    attempts,
                    source,
                });
            }
            Err(e) => {
                debug!(%addr, attempt, "connect failed, retrying: {}", e);
                attempt += 1;
                tokio::time::sleep(config.connect_retry_interval).await;
            }
        }
    }
}

/// Read responses in wire order until the peer goes away or CLEANUP is
/// answered.
async fn receive_loop(mut reader: OwnedReadHalf, pending: Arc<Pending>, max_transfer: usize) {
    loop {
        let record = match protocol::read_record(&mut reader).await {
            Ok(record) => record,
            Err(ProtocolError::ConnectionClosed) => {
                debug!("daemon closed the connection");
                break;
            }
            Err(e) => {
                warn!("Failed to read response: {}", e);
                break;
            }
        };

        let data = if record.kind == RequestKind::Read
            && record.status() == Status::Ok
            && record.return_size > 0
        {
            match protocol::read_payload(&mut reader, record.return_size, max_transfer).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(context = record.context, "Failed to read payload: {}", e);
                    break;
                }
            }
        } else {
            Vec::new()
        };

        let terminal = record.kind == RequestKind::Cleanup;
        let waiter = pending.waiters().remove(&record.context);
        match waiter {
            Some(tx) => {
                // The waiter may have given up; nothing to do then.
                let _ = tx.send(Completion { record, data });
            }
            None => warn!(context = record.context, "response for unknown request"),
        }
        if terminal {
            break;
        }
    }
    pending.close();
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
