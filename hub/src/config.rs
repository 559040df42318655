use std::env;
use std::path::PathBuf;

/// Hub configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind: String,
    pub port: u16,

    // ── Storage ────────────────────────────────────────────────────
    pub db_path: PathBuf,
    pub db_pool_size: u32,

    // ── Ingestion ──────────────────────────────────────────────────
    /// Tracked symbols. Empty ⇒ enumerate whatever storage knows.
    pub symbols: Vec<String>,
    pub sync_interval_secs: u64,
    /// Where the very first backfill starts when a collection is empty.
    pub bootstrap_start_ms: i64,

    // ── Upstream REST ──────────────────────────────────────────────
    pub binance_base_url: String,
    pub request_limit: u32,
    pub http_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,

    // ── WebSocket broker ───────────────────────────────────────────
    pub ws_queue_capacity: usize,
}

/// 2025-06-01T00:00:00Z, the default bootstrap date.
const DEFAULT_BOOTSTRAP_MS: i64 = 1_748_736_000_000;

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_symbols(name: &str) -> Vec<String> {
    env::var(name)
        .ok()
        .map(|s| {
            s.split(',')
                .map(|part| part.trim().to_ascii_uppercase())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// RFC3339 instant → epoch ms, falling back to the default on parse
/// failure.
fn env_instant_ms(name: &str, default_ms: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(default_ms)
}

impl HubConfig {
    pub fn from_env() -> Self {
        Self {
            bind: env_str("CANDLECAST_BIND", "0.0.0.0"),
            port: env_u16("CANDLECAST_PORT", 8888),
            db_path: PathBuf::from(env_str("CANDLECAST_DB", "candlecast.db")),
            db_pool_size: env_u32("CANDLECAST_DB_POOL", 8),
            symbols: env_symbols("CANDLECAST_SYMBOLS"),
            sync_interval_secs: env_u64("CANDLECAST_SYNC_INTERVAL_SECS", 60),
            bootstrap_start_ms: env_instant_ms("CANDLECAST_BOOTSTRAP_START", DEFAULT_BOOTSTRAP_MS),
            binance_base_url: env_str("CANDLECAST_UPSTREAM_URL", "https://api.binance.com"),
            request_limit: env_u32("CANDLECAST_REQUEST_LIMIT", 1000),
            http_timeout_secs: env_u64("CANDLECAST_HTTP_TIMEOUT_SECS", 30),
            max_retries: env_u32("CANDLECAST_MAX_RETRIES", 3),
            retry_base_ms: env_u64("CANDLECAST_RETRY_BASE_MS", 500),
            retry_cap_ms: env_u64("CANDLECAST_RETRY_CAP_MS", 30_000),
            ws_queue_capacity: env_usize("CANDLECAST_WS_QUEUE_CAPACITY", 64),
        }
    }
}
