//! Wire protocol for the terminal bridge: one JSON object per frame.
//!
//! Requests carry `action` + `requestId` (+ optional `params`); responses
//! echo both and add `success` with either `data` or `error`. Frames whose
//! `action` or `requestId` is missing or not a string are rejected before
//! they can reach the pending-call table.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// The closed set of calls the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Ping,
    AccountInfo,
    Positions,
    History,
    SymbolInfo,
    OpenPosition,
    ModifyPosition,
    PartialClose,
    ClosePosition,
    CloseAllPositions,
    GetPrice,
    GetBars,
    GetMultiTimeframeBars,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Ping => "ping",
            Action::AccountInfo => "accountInfo",
            Action::Positions => "positions",
            Action::History => "history",
            Action::SymbolInfo => "symbolInfo",
            Action::OpenPosition => "openPosition",
            Action::ModifyPosition => "modifyPosition",
            Action::PartialClose => "partialClose",
            Action::ClosePosition => "closePosition",
            Action::CloseAllPositions => "closeAllPositions",
            Action::GetPrice => "getPrice",
            Action::GetBars => "getBars",
            Action::GetMultiTimeframeBars => "getMultiTimeframeBars",
        }
    }

    /// Per-action deadline, or None for actions that take the client's
    /// configured fallback timeout.
    pub fn override_timeout_ms(&self) -> Option<u64> {
        match self {
            Action::Ping | Action::GetPrice => Some(3_000),
            Action::OpenPosition
            | Action::ModifyPosition
            | Action::PartialClose
            | Action::ClosePosition => Some(10_000),
            Action::CloseAllPositions => Some(20_000),
            Action::GetBars => Some(15_000),
            Action::GetMultiTimeframeBars => Some(30_000),
            Action::AccountInfo | Action::Positions | Action::History | Action::SymbolInfo => None,
        }
    }

    /// Deadline with the stock 5s fallback for non-override actions.
    pub fn default_timeout_ms(&self) -> u64 {
        self.override_timeout_ms().unwrap_or(5_000)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ping" => Ok(Action::Ping),
            "accountInfo" => Ok(Action::AccountInfo),
            "positions" => Ok(Action::Positions),
            "history" => Ok(Action::History),
            "symbolInfo" => Ok(Action::SymbolInfo),
            "openPosition" => Ok(Action::OpenPosition),
            "modifyPosition" => Ok(Action::ModifyPosition),
            "partialClose" => Ok(Action::PartialClose),
            "closePosition" => Ok(Action::ClosePosition),
            "closeAllPositions" => Ok(Action::CloseAllPositions),
            "getPrice" => Ok(Action::GetPrice),
            "getBars" => Ok(Action::GetBars),
            "getMultiTimeframeBars" => Ok(Action::GetMultiTimeframeBars),
            other => Err(BridgeError::UnknownAction(other.to_string())),
        }
    }
}

pub fn is_valid_action(name: &str) -> bool {
    Action::from_str(name).is_ok()
}

#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub action: Action,
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub action: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Build one outbound frame. Empty params are omitted entirely.
pub fn encode(action: Action, params: Map<String, Value>, request_id: &str) -> String {
    let request = Request {
        action,
        request_id: request_id.to_string(),
        params: if params.is_empty() { None } else { Some(params) },
    };
    serde_json::to_string(&request).unwrap_or_default()
}

/// Parse one inbound frame, enforcing the string-typed `action` and
/// `requestId` fields before anything downstream sees the payload.
pub fn decode(raw: &str) -> Result<Response, BridgeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| BridgeError::Protocol(e.to_string()))?;

    for field in ["action", "requestId"] {
        match value.get(field) {
            Some(Value::String(_)) => {}
            Some(_) => {
                return Err(BridgeError::Protocol(format!("{} is not a string", field)))
            }
            None => return Err(BridgeError::Protocol(format!("missing {}", field))),
        }
    }

    serde_json::from_value(value).map_err(|e| BridgeError::Protocol(e.to_string()))
}
