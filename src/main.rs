use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use sentinelfx::agent::TradingAgent;
use sentinelfx::config::Config;
use sentinelfx::fundamentals::HttpFundamentals;
use sentinelfx::logging::{log, obj, v_str, Domain, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "starting",
        obj(&[
            ("bridge_addr", v_str(&cfg.bridge_addr)),
            ("theses_dir", v_str(&cfg.theses_dir)),
            ("check_interval_secs", json!(cfg.check_interval_secs)),
        ]),
    );

    let source = Arc::new(HttpFundamentals::new(
        cfg.fundamentals_timeout_secs,
        cfg.headlines_per_source,
    )?);
    let agent = TradingAgent::new(&cfg, source)?;

    // A dead bridge at startup is fatal; everything after this point is
    // fail-soft.
    agent.start().await?;

    tokio::signal::ctrl_c().await?;
    log(
        Level::Info,
        Domain::System,
        "shutting_down",
        serde_json::Map::new(),
    );
    agent.stop().await;
    Ok(())
}
