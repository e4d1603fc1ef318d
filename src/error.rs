use thiserror::Error;

use crate::bridge::protocol::Action;

/// Failure modes of a single bridge call. Each variant affects only the
/// call that produced it; nothing here tears down the connection.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("not connected to bridge")]
    NotConnected,

    #[error("request timed out after {elapsed_ms}ms: {action} ({request_id})")]
    Timeout {
        action: Action,
        request_id: String,
        elapsed_ms: u64,
    },

    #[error("send failed: {0}")]
    Transmit(String),

    #[error("bridge rejected request: {0}")]
    Remote(String),

    #[error("disconnected while request in flight")]
    Disconnected,

    #[error("invalid frame: {0}")]
    Protocol(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),
}

impl BridgeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}
