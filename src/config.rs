#[derive(Clone, Debug)]
pub struct Config {
    /// host:port of the trading terminal bridge
    pub bridge_addr: String,
    pub theses_dir: String,
    /// seconds between invalidation ticks
    pub check_interval_secs: u64,
    /// fallback timeout for calls without a per-action override
    pub call_timeout_ms: u64,
    /// per-request timeout for headline fetches
    pub fundamentals_timeout_secs: u64,
    /// max headlines kept per source
    pub headlines_per_source: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bridge_addr: std::env::var("BRIDGE_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:51128".to_string()),
            theses_dir: std::env::var("THESES_DIR").unwrap_or_else(|_| "./theses".to_string()),
            check_interval_secs: std::env::var("CHECK_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1800),
            call_timeout_ms: std::env::var("CALL_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            fundamentals_timeout_secs: std::env::var("FUNDAMENTALS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            headlines_per_source: std::env::var("HEADLINES_PER_SOURCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
