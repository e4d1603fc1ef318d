//! Client for the remote trading-terminal bridge.
//!
//! `RpcClient` is the transport/correlation core; `BridgeClient` puts a
//! typed method per bridge action on top of it, each with that action's
//! timeout-table deadline or the client's configured fallback.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::BridgeError;

pub mod client;
pub mod protocol;

pub use client::RpcClient;
use protocol::Action;

/// Read-only view of one open position at the terminal. `comment` is the
/// only linkage back to a thesis: equality with a thesis id, nothing more.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: String,
    pub volume: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub net_profit: f64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedPosition {
    pub position_id: String,
    pub entry_price: f64,
    #[serde(default)]
    pub lots: f64,
}

#[derive(Debug, Clone, Default)]
pub struct OpenOrder {
    pub symbol: String,
    pub side: String,
    pub volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub comment: Option<String>,
}

pub struct BridgeClient {
    rpc: RpcClient,
    call_timeout_ms: u64,
}

impl BridgeClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_call_timeout(addr, 5_000)
    }

    /// `call_timeout_ms` is the deadline for actions without a per-action
    /// override in the protocol timeout table.
    pub fn with_call_timeout(addr: impl Into<String>, call_timeout_ms: u64) -> Self {
        Self {
            rpc: RpcClient::new(addr),
            call_timeout_ms,
        }
    }

    pub async fn connect(&self) -> anyhow::Result<()> {
        self.rpc.connect().await
    }

    pub async fn disconnect(&self) {
        self.rpc.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.rpc.is_connected()
    }

    pub fn pending_count(&self) -> usize {
        self.rpc.pending_count()
    }

    async fn call(&self, action: Action, params: Map<String, Value>) -> Result<Value, BridgeError> {
        let timeout_ms = action
            .override_timeout_ms()
            .unwrap_or(self.call_timeout_ms);
        self.rpc.call(action, params, timeout_ms).await
    }

    pub async fn ping(&self) -> Result<Value, BridgeError> {
        self.call(Action::Ping, Map::new()).await
    }

    pub async fn account_info(&self) -> Result<Value, BridgeError> {
        self.call(Action::AccountInfo, Map::new()).await
    }

    pub async fn positions(&self) -> Result<Vec<Position>, BridgeError> {
        let data = self.call(Action::Positions, Map::new()).await?;
        let raw = data.get("positions").cloned().unwrap_or(json!([]));
        serde_json::from_value(raw).map_err(|e| BridgeError::Protocol(e.to_string()))
    }

    pub async fn history(&self, count: u32) -> Result<Value, BridgeError> {
        let mut params = Map::new();
        params.insert("count".to_string(), json!(count));
        self.call(Action::History, params).await
    }

    pub async fn symbol_info(&self, symbol: &str) -> Result<Value, BridgeError> {
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(symbol));
        self.call(Action::SymbolInfo, params).await
    }

    pub async fn open_position(&self, order: &OpenOrder) -> Result<OpenedPosition, BridgeError> {
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(order.symbol));
        params.insert("side".to_string(), json!(order.side));
        params.insert("volume".to_string(), json!(order.volume));
        if let Some(sl) = order.stop_loss {
            params.insert("stopLoss".to_string(), json!(sl));
        }
        if let Some(tp) = order.take_profit {
            params.insert("takeProfit".to_string(), json!(tp));
        }
        if let Some(comment) = &order.comment {
            params.insert("comment".to_string(), json!(comment));
        }
        let data = self.call(Action::OpenPosition, params).await?;
        serde_json::from_value(data).map_err(|e| BridgeError::Protocol(e.to_string()))
    }

    pub async fn modify_position(
        &self,
        position_id: &str,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<Value, BridgeError> {
        let mut params = Map::new();
        params.insert("positionId".to_string(), json!(position_id));
        if let Some(sl) = stop_loss {
            params.insert("stopLoss".to_string(), json!(sl));
        }
        if let Some(tp) = take_profit {
            params.insert("takeProfit".to_string(), json!(tp));
        }
        self.call(Action::ModifyPosition, params).await
    }

    pub async fn partial_close(
        &self,
        position_id: &str,
        volume_to_close: f64,
    ) -> Result<Value, BridgeError> {
        let mut params = Map::new();
        params.insert("positionId".to_string(), json!(position_id));
        params.insert("volumeToClose".to_string(), json!(volume_to_close));
        self.call(Action::PartialClose, params).await
    }

    pub async fn close_position(&self, position_id: &str) -> Result<Value, BridgeError> {
        let mut params = Map::new();
        params.insert("positionId".to_string(), json!(position_id));
        self.call(Action::ClosePosition, params).await
    }

    pub async fn close_all_positions(&self) -> Result<Value, BridgeError> {
        self.call(Action::CloseAllPositions, Map::new()).await
    }

    pub async fn get_price(&self, symbol: &str) -> Result<Value, BridgeError> {
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(symbol));
        self.call(Action::GetPrice, params).await
    }

    pub async fn get_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        count: u32,
    ) -> Result<Value, BridgeError> {
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(symbol));
        params.insert("timeframe".to_string(), json!(timeframe));
        params.insert("count".to_string(), json!(count));
        self.call(Action::GetBars, params).await
    }

    pub async fn get_multi_timeframe_bars(
        &self,
        symbol: &str,
        timeframes: &[(&str, u32)],
    ) -> Result<Value, BridgeError> {
        let mut tf = Map::new();
        for (name, count) in timeframes {
            tf.insert((*name).to_string(), json!(count));
        }
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(symbol));
        params.insert("timeframes".to_string(), Value::Object(tf));
        self.call(Action::GetMultiTimeframeBars, params).await
    }
}
