//! Wires the bridge client, thesis store, and invalidation engine into an
//! unattended agent.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::Duration;

use crate::bridge::{BridgeClient, OpenOrder, OpenedPosition};
use crate::config::Config;
use crate::fundamentals::FundamentalsSource;
use crate::invalidation::InvalidationEngine;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::thesis::{Thesis, ThesisStatus, ThesisStore};

#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: String,
    pub volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub reasoning: String,
    pub invalidation_conditions: Vec<String>,
    pub fundamental_anchors: Vec<String>,
}

pub struct TradingAgent {
    bridge: Arc<BridgeClient>,
    store: Arc<ThesisStore>,
    engine: InvalidationEngine,
}

impl TradingAgent {
    pub fn new(cfg: &Config, source: Arc<dyn FundamentalsSource>) -> Result<Self> {
        let bridge = Arc::new(BridgeClient::with_call_timeout(
            cfg.bridge_addr.clone(),
            cfg.call_timeout_ms,
        ));
        let store = Arc::new(ThesisStore::new(&cfg.theses_dir)?);
        let engine = InvalidationEngine::new(
            bridge.clone(),
            store.clone(),
            source,
            Duration::from_secs(cfg.check_interval_secs),
        );
        Ok(Self {
            bridge,
            store,
            engine,
        })
    }

    pub fn bridge(&self) -> &BridgeClient {
        &self.bridge
    }

    pub fn store(&self) -> &ThesisStore {
        &self.store
    }

    pub fn engine(&self) -> &InvalidationEngine {
        &self.engine
    }

    /// Connect, prove the bridge is alive, then start the invalidation
    /// loop. A failed ping is the one error here that should abort the
    /// hosting process.
    pub async fn start(&self) -> Result<()> {
        self.bridge.connect().await?;
        let pong = self
            .bridge
            .ping()
            .await
            .context("bridge liveness check failed")?;
        log(
            Level::Info,
            Domain::System,
            "agent_started",
            obj(&[("ping", pong.clone())]),
        );
        self.engine.start().await;
        Ok(())
    }

    /// Engine first, transport second: no closure logic may run against a
    /// disconnected bridge.
    pub async fn stop(&self) {
        self.engine.stop().await;
        self.bridge.disconnect().await;
        log(
            Level::Info,
            Domain::System,
            "agent_stopped",
            serde_json::Map::new(),
        );
    }

    /// Create the thesis, open the position with the thesis id as its
    /// comment (the only linkage there is), then note the fill on the
    /// thesis. A failed open leaves the thesis ACTIVE and unlinked; the
    /// next tick marks it ORPHANED.
    pub async fn open_trade_with_thesis(
        &self,
        request: &TradeRequest,
    ) -> Result<(OpenedPosition, Thesis)> {
        let thesis = self.store.create(
            &request.symbol,
            &request.side,
            &request.reasoning,
            request.invalidation_conditions.clone(),
            request.fundamental_anchors.clone(),
        )?;

        let order = OpenOrder {
            symbol: request.symbol.clone(),
            side: request.side.clone(),
            volume: request.volume,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            comment: Some(thesis.id.clone()),
        };
        let position = self.bridge.open_position(&order).await?;

        self.store.update_status(
            &thesis.id,
            ThesisStatus::Active,
            &format!(
                "position opened: {} @ {}",
                position.position_id, position.entry_price
            ),
        )?;

        log(
            Level::Info,
            Domain::System,
            "trade_opened",
            obj(&[
                ("symbol", v_str(&request.symbol)),
                ("side", v_str(&request.side)),
                ("position_id", v_str(&position.position_id)),
                ("thesis_id", v_str(&thesis.id)),
            ]),
        );
        Ok((position, thesis))
    }
}
