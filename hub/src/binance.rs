//! Upstream REST client for public minute klines.
//!
//! `/api/v3/klines` returns an array of rows; each row is an array of
//! mixed numbers and numeric strings. Transient failures (network,
//! 5xx, rate limit) are retried inside one call with bounded
//! exponential backoff; a malformed payload is a protocol error and
//! drops the whole batch so the next tick can retry cleanly.

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use cast_core::candle::Candle;
use cast_core::time::MINUTE_MS;

use crate::config::HubConfig;

/// Upstream failure kinds; only `Transient` is worth retrying.
#[derive(Debug)]
pub enum FetchError {
    Transient(String),
    Protocol(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "upstream transient: {msg}"),
            Self::Protocol(msg) => write!(f, "upstream protocol: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    request_limit: u32,
    max_retries: u32,
    retry_base_ms: u64,
    retry_cap_ms: u64,
}

impl BinanceClient {
    pub fn new(cfg: &HubConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.binance_base_url.trim_end_matches('/').to_string(),
            request_limit: cfg.request_limit.clamp(1, 1000),
            max_retries: cfg.max_retries,
            retry_base_ms: cfg.retry_base_ms,
            retry_cap_ms: cfg.retry_cap_ms,
        })
    }

    /// One window of minute klines with `open_time` in
    /// `[start_ms, end_ms]`, capped at the per-request limit.
    /// Retries transient failures with exponential backoff before
    /// giving up.
    pub async fn fetch_page(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, FetchError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval=1m&startTime={}&endTime={}&limit={}",
            self.base_url,
            symbol.to_ascii_uppercase(),
            start_ms,
            end_ms,
            self.request_limit,
        );

        let mut last_err = FetchError::Transient("no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            let mut backoff: Option<Duration> = None;

            match self.http.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let rows: Vec<Value> = resp
                            .json()
                            .await
                            .map_err(|e| FetchError::Protocol(format!("kline body: {e}")))?;
                        return rows.iter().map(parse_kline_row).collect();
                    }
                    if status.as_u16() == 429 {
                        // Respect Retry-After when the exchange sends it.
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok());
                        backoff = retry_after.map(Duration::from_secs);
                        last_err = FetchError::Transient(format!("HTTP {status}"));
                    } else if status.is_server_error() {
                        last_err = FetchError::Transient(format!("HTTP {status}"));
                    } else {
                        return Err(FetchError::Protocol(format!("HTTP {status}")));
                    }
                }
                Err(e) => {
                    last_err = FetchError::Transient(format!("request failed: {e}"));
                }
            }

            if attempt < self.max_retries {
                let delay = backoff.unwrap_or_else(|| self.backoff_delay(attempt));
                debug!(symbol, attempt, ?delay, "retrying kline fetch");
                tokio::time::sleep(delay).await;
            }
        }

        warn!(symbol, retries = self.max_retries, "kline fetch exhausted retries");
        Err(last_err)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let ms = self
            .retry_base_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.retry_cap_ms);
        Duration::from_millis(ms)
    }

    /// All minute klines with `open_time` in `[start_ms, end_ms]`,
    /// paging through the per-request cap.
    pub async fn fetch_range(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, FetchError> {
        let mut out: Vec<Candle> = Vec::new();
        let mut current = start_ms;

        while current <= end_ms {
            let page = self.fetch_page(symbol, current, end_ms).await?;
            let Some(last) = page.last() else { break };
            current = last.close_time + 1;
            let full_page = page.len() as u32 >= self.request_limit;
            out.extend(page);
            if !full_page {
                break;
            }
            // Brief pause between windows to stay friendly with the
            // upstream rate limits.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Ok(out)
    }
}

fn field_f64(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str()?.trim().parse().ok())
}

/// One upstream kline row:
/// `[open_time, open, high, low, close, volume, close_time,
///   quote_volume, trades, taker_base, taker_quote, ...]`
/// with prices and volumes encoded as strings.
fn parse_kline_row(row: &Value) -> Result<Candle, FetchError> {
    let fields = row
        .as_array()
        .filter(|a| a.len() >= 11)
        .ok_or_else(|| FetchError::Protocol(format!("kline row shape: {row}")))?;

    let bad = |what: &str| FetchError::Protocol(format!("kline row field {what}: {row}"));

    let open_time = fields[0].as_i64().ok_or_else(|| bad("open_time"))?;
    if open_time.rem_euclid(MINUTE_MS) != 0 {
        return Err(FetchError::Protocol(format!(
            "open_time {open_time} not on a minute boundary"
        )));
    }

    Ok(Candle {
        open_time,
        open: field_f64(&fields[1]).ok_or_else(|| bad("open"))?,
        high: field_f64(&fields[2]).ok_or_else(|| bad("high"))?,
        low: field_f64(&fields[3]).ok_or_else(|| bad("low"))?,
        close: field_f64(&fields[4]).ok_or_else(|| bad("close"))?,
        volume: field_f64(&fields[5]).ok_or_else(|| bad("volume"))?,
        close_time: fields[6].as_i64().ok_or_else(|| bad("close_time"))?,
        quote_asset_volume: field_f64(&fields[7]).ok_or_else(|| bad("quote_asset_volume"))?,
        number_of_trades: fields[8].as_i64().ok_or_else(|| bad("number_of_trades"))?,
        taker_buy_base_asset_volume: field_f64(&fields[9]).ok_or_else(|| bad("taker_buy_base"))?,
        taker_buy_quote_asset_volume: field_f64(&fields[10])
            .ok_or_else(|| bad("taker_buy_quote"))?,
    })
}
