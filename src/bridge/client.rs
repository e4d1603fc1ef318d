//! Async RPC core: one persistent TCP connection, many concurrent calls.
//!
//! Every call gets a random 128-bit id and a slot in the pending table
//! before its frame leaves the socket, so a reply can never race past the
//! registration. A single reader task matches inbound frames to pending
//! slots; replies for unknown ids (timed out, already resolved, or
//! spurious) and malformed frames are dropped without touching anything
//! else. Each call resolves exactly once: via the reader, via its own
//! deadline, or via disconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::Rng;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use crate::error::BridgeError;
use crate::logging::{log, obj, v_str, Domain, Level};

use super::protocol::{self, Action};

enum Outcome {
    Success(Value),
    Remote(String),
    Disconnected,
}

struct PendingCall {
    tx: oneshot::Sender<Outcome>,
}

struct Shared {
    pending: Mutex<HashMap<String, PendingCall>>,
    connected: AtomicBool,
}

impl Shared {
    /// Reject everything in flight and leave the table empty.
    fn fail_all_pending(&self) {
        let drained: Vec<PendingCall> = match self.pending.lock() {
            Ok(mut map) => map.drain().map(|(_, p)| p).collect(),
            Err(_) => Vec::new(),
        };
        for pending in drained {
            let _ = pending.tx.send(Outcome::Disconnected);
        }
    }
}

pub struct RpcClient {
    addr: String,
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    reader_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RpcClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            shared: Arc::new(Shared {
                pending: Mutex::new(HashMap::new()),
                connected: AtomicBool::new(false),
            }),
            writer: tokio::sync::Mutex::new(None),
            reader_task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// No-op when already connected.
    pub async fn connect(&self) -> anyhow::Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let stream = TcpStream::connect(&self.addr).await?;
        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        self.shared.connected.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let handle = tokio::spawn(read_loop(read_half, shared));
        *self.reader_task.lock().await = Some(handle);

        log(
            Level::Info,
            Domain::Bridge,
            "connected",
            obj(&[("addr", v_str(&self.addr))]),
        );
        Ok(())
    }

    /// Always safe to call, in any state, any number of times. Stops the
    /// reader before draining the table so no reply can resolve a call
    /// after it has been rejected here.
    pub async fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);

        if let Some(handle) = self.reader_task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        self.shared.fail_all_pending();

        log(Level::Info, Domain::Bridge, "disconnected", Map::new());
    }

    pub async fn call(
        &self,
        action: Action,
        params: Map<String, Value>,
        timeout_ms: u64,
    ) -> Result<Value, BridgeError> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }

        let request_id = new_request_id();
        let frame = protocol::encode(action, params, &request_id);

        // Register before transmitting: a reply must never find the table
        // without its slot.
        let (tx, rx) = oneshot::channel();
        if let Ok(mut map) = self.shared.pending.lock() {
            map.insert(request_id.clone(), PendingCall { tx });
        }

        let started = Instant::now();
        if let Err(err) = self.transmit(&frame).await {
            self.forget(&request_id);
            return Err(BridgeError::Transmit(err.to_string()));
        }

        match timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(Outcome::Success(data))) => Ok(data),
            Ok(Ok(Outcome::Remote(message))) => Err(BridgeError::Remote(message)),
            Ok(Ok(Outcome::Disconnected)) | Ok(Err(_)) => Err(BridgeError::Disconnected),
            Err(_) => {
                // Late replies for this id are now unknown and get dropped.
                self.forget(&request_id);
                Err(BridgeError::Timeout {
                    action,
                    request_id,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                })
            }
        }
    }

    async fn transmit(&self, frame: &str) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "no active writer")
        })?;
        writer.write_all(frame.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }

    fn forget(&self, request_id: &str) {
        if let Ok(mut map) = self.shared.pending.lock() {
            map.remove(request_id);
        }
    }
}

fn new_request_id() -> String {
    format!("{:032x}", rand::thread_rng().gen::<u128>())
}

async fn read_loop(read_half: OwnedReadHalf, shared: Arc<Shared>) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };

        let response = match protocol::decode(&line) {
            Ok(response) => response,
            Err(err) => {
                log(
                    Level::Debug,
                    Domain::Bridge,
                    "frame_rejected",
                    obj(&[("reason", v_str(&err.to_string()))]),
                );
                continue;
            }
        };

        let pending = match shared.pending.lock() {
            Ok(mut map) => map.remove(&response.request_id),
            Err(_) => None,
        };
        let Some(pending) = pending else {
            // Already timed out, already resolved, or never ours.
            log(
                Level::Debug,
                Domain::Bridge,
                "orphan_reply",
                obj(&[
                    ("request_id", v_str(&response.request_id)),
                    ("action", v_str(&response.action)),
                ]),
            );
            continue;
        };

        let outcome = if response.success {
            Outcome::Success(response.data.unwrap_or(Value::Null))
        } else {
            Outcome::Remote(
                response
                    .error
                    .unwrap_or_else(|| "request failed".to_string()),
            )
        };
        // The caller may have just timed out; a dropped receiver is fine.
        let _ = pending.tx.send(outcome);
    }

    // Peer closed the connection or the stream errored: no reply will ever
    // match again, so everything in flight is rejected.
    shared.connected.store(false, Ordering::SeqCst);
    shared.fail_all_pending();
    log(Level::Info, Domain::Bridge, "reader_stopped", Map::new());
}
