//! In-process scripted bridge endpoint for RPC tests.
//!
//! The handler sees each parsed request and returns raw reply lines, each
//! with a delay in milliseconds. Returning nothing simulates a bridge that
//! never answers; returning garbage exercises the frame-rejection path.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

pub type Replies = Vec<(u64, String)>;

pub struct MockBridge {
    pub addr: String,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

pub async fn spawn_bridge<H>(handler: H) -> MockBridge
where
    H: Fn(Value) -> Replies + Send + Sync + 'static,
{
    spawn_bridge_inner(handler, false).await
}

/// A bridge that accepts and immediately hangs up on every connection.
#[allow(dead_code)]
pub async fn spawn_hangup_bridge() -> MockBridge {
    spawn_bridge_inner(|_| Vec::new(), true).await
}

async fn spawn_bridge_inner<H>(handler: H, hangup: bool) -> MockBridge
where
    H: Fn(Value) -> Replies + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handler = Arc::new(handler);

    let handle = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            if hangup {
                drop(stream);
                continue;
            }
            let handler = handler.clone();
            tokio::spawn(async move {
                let (read_half, write_half) = stream.into_split();
                let writer = Arc::new(tokio::sync::Mutex::new(write_half));
                let mut lines = BufReader::new(read_half).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let request: Value = match serde_json::from_str(&line) {
                        Ok(value) => value,
                        Err(_) => continue,
                    };
                    for (delay_ms, reply) in handler(request.clone()) {
                        let writer = writer.clone();
                        tokio::spawn(async move {
                            if delay_ms > 0 {
                                sleep(Duration::from_millis(delay_ms)).await;
                            }
                            let mut w = writer.lock().await;
                            let _ = w.write_all(reply.as_bytes()).await;
                            let _ = w.write_all(b"\n").await;
                        });
                    }
                }
            });
        }
    });

    MockBridge { addr, handle }
}

pub fn ok_reply(request: &Value, data: Value) -> String {
    json!({
        "action": request["action"],
        "requestId": request["requestId"],
        "success": true,
        "data": data,
    })
    .to_string()
}

#[allow(dead_code)]
pub fn err_reply(request: &Value, error: &str) -> String {
    json!({
        "action": request["action"],
        "requestId": request["requestId"],
        "success": false,
        "error": error,
    })
    .to_string()
}
