//! Periodic thesis invalidation.
//!
//! One background task owns the schedule; ticks never overlap because the
//! loop awaits each tick before waiting for the next firing. A tick is
//! fail-soft at the top (no position list, no processing) and fail-open
//! per thesis (no conditions or no headlines means still valid). Every
//! per-thesis error is contained to that thesis.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::bridge::{BridgeClient, Position};
use crate::fundamentals::FundamentalsSource;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::thesis::{Thesis, ThesisStatus, ThesisStore};

/// A condition triggers when any single headline contains at least this
/// share of its significant terms.
const TERM_MATCH_THRESHOLD: f64 = 0.5;

pub const STILL_VALID_NOTE: &str = "fundamentals support thesis";
pub const ORPHANED_NOTE: &str = "no linked positions found";

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Orphaned,
    StillValid,
    Invalidated {
        reasons: Vec<String>,
        closed: u32,
        failed: u32,
    },
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct ThesisOutcome {
    pub thesis_id: String,
    pub symbol: String,
    pub outcome: TickOutcome,
}

#[derive(Debug, Clone)]
pub struct Validation {
    pub valid: bool,
    pub reasons: Vec<String>,
}

/// Tokens longer than three characters, lowercased.
pub fn significant_terms(condition: &str) -> Vec<String> {
    condition
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '.' | '!' | '?' | '(' | ')'))
        .filter(|w| w.len() > 3)
        .map(str::to_string)
        .collect()
}

/// Judge recorded invalidation conditions against lowercased headlines.
/// Absence of data never invalidates: no conditions or no headlines means
/// the thesis stands.
pub fn validate(conditions: &[String], headlines: &[String]) -> Validation {
    if conditions.is_empty() {
        return Validation {
            valid: true,
            reasons: vec!["no invalidation conditions to check".to_string()],
        };
    }
    if headlines.is_empty() {
        return Validation {
            valid: true,
            reasons: vec!["no fundamental data available to validate against".to_string()],
        };
    }

    let mut valid = true;
    let mut reasons = Vec::new();
    for condition in conditions {
        let terms = significant_terms(condition);
        if terms.is_empty() {
            continue;
        }
        for headline in headlines {
            let matched = terms
                .iter()
                .filter(|term| headline.contains(term.as_str()))
                .count();
            if matched as f64 / terms.len() as f64 >= TERM_MATCH_THRESHOLD {
                valid = false;
                reasons.push(format!("condition triggered: \"{}\"", condition));
                break;
            }
        }
    }

    if valid {
        reasons.push("all invalidation conditions still hold".to_string());
    }
    Validation { valid, reasons }
}

struct Runner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct InvalidationEngine {
    bridge: Arc<BridgeClient>,
    store: Arc<ThesisStore>,
    source: Arc<dyn FundamentalsSource>,
    period: Duration,
    runner: tokio::sync::Mutex<Option<Runner>>,
}

impl InvalidationEngine {
    pub fn new(
        bridge: Arc<BridgeClient>,
        store: Arc<ThesisStore>,
        source: Arc<dyn FundamentalsSource>,
        period: Duration,
    ) -> Self {
        Self {
            bridge,
            store,
            source,
            period,
            runner: tokio::sync::Mutex::new(None),
        }
    }

    /// Runs one tick immediately, then keeps ticking at the fixed period.
    /// No-op when already started.
    pub async fn start(&self) {
        let mut runner = self.runner.lock().await;
        if runner.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let bridge = self.bridge.clone();
        let store = self.store.clone();
        let source = self.source.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            // A tick running past its period delays the next firing
            // instead of stacking up behind it.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        run_tick(&bridge, &store, source.as_ref()).await;
                    }
                }
            }
        });

        *runner = Some(Runner { shutdown, handle });
        log(
            Level::Info,
            Domain::Invalidation,
            "started",
            obj(&[("period_secs", json!(self.period.as_secs()))]),
        );
    }

    /// After this returns no further tick will run; a tick already in
    /// flight is allowed to finish first. No-op when not started.
    pub async fn stop(&self) {
        let Some(runner) = self.runner.lock().await.take() else {
            return;
        };
        let _ = runner.shutdown.send(true);
        let _ = runner.handle.await;
        log(
            Level::Info,
            Domain::Invalidation,
            "stopped",
            serde_json::Map::new(),
        );
    }

    /// One synchronous pass over all active theses.
    pub async fn run_tick(&self) -> Vec<ThesisOutcome> {
        run_tick(&self.bridge, &self.store, self.source.as_ref()).await
    }
}

async fn run_tick(
    bridge: &BridgeClient,
    store: &ThesisStore,
    source: &dyn FundamentalsSource,
) -> Vec<ThesisOutcome> {
    let active = store.list_active();
    if active.is_empty() {
        return Vec::new();
    }

    // One position fetch per tick, not per thesis. If it fails, the whole
    // tick is abandoned and the next firing retries.
    let positions = match bridge.positions().await {
        Ok(positions) => positions,
        Err(err) => {
            log(
                Level::Warn,
                Domain::Invalidation,
                "tick_abandoned",
                obj(&[("reason", v_str(&err.to_string()))]),
            );
            return Vec::new();
        }
    };

    let mut outcomes = Vec::with_capacity(active.len());
    for thesis in active {
        let outcome = match check_thesis(bridge, store, source, &thesis, &positions).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Invalidation,
                    "thesis_check_failed",
                    obj(&[
                        ("thesis_id", v_str(&thesis.id)),
                        ("reason", v_str(&err.to_string())),
                    ]),
                );
                TickOutcome::Skipped(err.to_string())
            }
        };
        outcomes.push(ThesisOutcome {
            thesis_id: thesis.id.clone(),
            symbol: thesis.symbol.clone(),
            outcome,
        });
    }
    outcomes
}

async fn check_thesis(
    bridge: &BridgeClient,
    store: &ThesisStore,
    source: &dyn FundamentalsSource,
    thesis: &Thesis,
    positions: &[Position],
) -> Result<TickOutcome> {
    let linked: Vec<&Position> = positions
        .iter()
        .filter(|p| p.comment == thesis.id)
        .collect();

    if linked.is_empty() {
        // Closed by some path outside this engine.
        store.update_status(&thesis.id, ThesisStatus::Orphaned, ORPHANED_NOTE)?;
        return Ok(TickOutcome::Orphaned);
    }

    let headlines = match source.check(&thesis.symbol).await {
        Ok(report) => report.all_headlines(),
        Err(err) => {
            // Fail-open: no signals, no closure.
            log(
                Level::Warn,
                Domain::Invalidation,
                "signal_fetch_failed",
                obj(&[
                    ("thesis_id", v_str(&thesis.id)),
                    ("reason", v_str(&err.to_string())),
                ]),
            );
            Vec::new()
        }
    };

    let validation = validate(&thesis.invalidation_conditions, &headlines);
    if validation.valid {
        store.update_status(&thesis.id, ThesisStatus::Active, STILL_VALID_NOTE)?;
        return Ok(TickOutcome::StillValid);
    }

    let mut closed = 0u32;
    let mut failed = 0u32;
    for position in &linked {
        match bridge.close_position(&position.id).await {
            Ok(_) => closed += 1,
            Err(err) => {
                failed += 1;
                log(
                    Level::Error,
                    Domain::Invalidation,
                    "close_failed",
                    obj(&[
                        ("position_id", v_str(&position.id)),
                        ("reason", v_str(&err.to_string())),
                    ]),
                );
            }
        }
    }

    let note = format!(
        "invalidated: {}; closed {} failed {}",
        validation.reasons.join("; "),
        closed,
        failed
    );
    store.update_status(&thesis.id, ThesisStatus::Closed, &note)?;
    Ok(TickOutcome::Invalidated {
        reasons: validation.reasons,
        closed,
        failed,
    })
}
