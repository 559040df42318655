//! The ingestion scheduler.
//!
//! Every tick (default 60 s), each tracked symbol is brought up to
//! date against the upstream: fetch from one minute past the stored
//! tail (or the bootstrap date on an empty collection) through the
//! current minute, upsert, and publish a sync event for the broker.
//! The same single-symbol path backs `POST /api/sync`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cast_core::candle::SymbolStats;
use cast_core::time::{floor_minute, now_ms, MINUTE_MS};
use cast_store::MarketStore;

use crate::binance::BinanceClient;
use crate::config::HubConfig;
use crate::error::HubError;

/// Published on the in-process bus after a symbol gained records.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub symbol: String,
    pub new_records: usize,
    pub total_records: i64,
    pub last_price: Option<f64>,
    pub last_record: Option<i64>,
}

/// Outcome of one single-symbol sync, also the `/api/sync` payload
/// source.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub new_records: usize,
    pub stats: SymbolStats,
}

pub struct Ingestor {
    store: MarketStore,
    client: BinanceClient,
    bus: broadcast::Sender<SyncEvent>,
    symbols: Vec<String>,
    interval: Duration,
    bootstrap_start_ms: i64,
}

/// Fetch window for one symbol: one minute past the stored tail (or
/// the bootstrap date) through the current minute, inclusive on
/// `open_time`. `None` when storage is already up to date.
pub fn sync_bounds(last_open_time: Option<i64>, bootstrap_ms: i64, now: i64) -> Option<(i64, i64)> {
    let start = match last_open_time {
        Some(t) => t + MINUTE_MS,
        None => bootstrap_ms,
    };
    let end = floor_minute(now);
    (start <= end).then_some((start, end))
}

impl Ingestor {
    pub fn new(
        store: MarketStore,
        client: BinanceClient,
        bus: broadcast::Sender<SyncEvent>,
        cfg: &HubConfig,
    ) -> Self {
        Self {
            store,
            client,
            bus,
            symbols: cfg.symbols.clone(),
            interval: Duration::from_secs(cfg.sync_interval_secs.max(1)),
            bootstrap_start_ms: cfg.bootstrap_start_ms,
        }
    }

    /// Periodic loop. Cancellation lets the in-flight tick finish.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(period_secs = self.interval.as_secs(), "ingest loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        info!("ingest loop stopped");
    }

    async fn tick(&self) {
        let symbols = if self.symbols.is_empty() {
            match self.store.known_symbols() {
                Ok(list) => list,
                Err(e) => {
                    warn!("cannot enumerate symbols: {e}");
                    return;
                }
            }
        } else {
            self.symbols.clone()
        };

        if symbols.is_empty() {
            debug!("no symbols to sync");
            return;
        }

        for symbol in &symbols {
            match self.sync_symbol(symbol).await {
                Ok(report) if report.new_records > 0 => {
                    info!(
                        symbol = %symbol,
                        new_records = report.new_records,
                        total = report.stats.total_records,
                        "sync complete"
                    );
                }
                Ok(_) => debug!(symbol = %symbol, "already up to date"),
                Err(e) => warn!(symbol = %symbol, "sync failed: {e}"),
            }
        }
    }

    /// Bring one symbol up to date and publish the sync event when
    /// anything new arrived.
    pub async fn sync_symbol(&self, symbol: &str) -> Result<SyncReport, HubError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        self.store.ensure_symbol(&symbol)?;

        let last = self.store.last_candle(&symbol)?;
        let mut new_records = 0usize;

        if let Some((start, end)) = sync_bounds(
            last.as_ref().map(|c| c.open_time),
            self.bootstrap_start_ms,
            now_ms(),
        ) {
            let candles = self.client.fetch_range(&symbol, start, end).await?;
            if !candles.is_empty() {
                new_records = self.store.upsert_candles(&symbol, &candles)?;
            }
        }

        let stats = self.store.stats(&symbol)?;
        if new_records > 0 {
            // Nobody listening is fine; send() only fails then.
            let _ = self.bus.send(SyncEvent {
                symbol: symbol.clone(),
                new_records,
                total_records: stats.total_records,
                last_price: stats.last_price,
                last_record: stats.last_record,
            });
        }

        Ok(SyncReport { new_records, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-11-17T14:45:00Z
    const T_1445: i64 = 1_763_390_700_000;

    #[test]
    fn incremental_bounds_cover_the_new_minutes() {
        // Storage tail at 14:45, wall clock 14:47:30 — the fetch
        // window is exactly the two minutes 14:46 and 14:47.
        let now = T_1445 + 2 * MINUTE_MS + 30_000;
        let (start, end) = sync_bounds(Some(T_1445), 0, now).unwrap();
        assert_eq!(start, T_1445 + MINUTE_MS);
        assert_eq!(end, T_1445 + 2 * MINUTE_MS);
        assert_eq!((end - start) / MINUTE_MS + 1, 2);
    }

    #[test]
    fn empty_storage_starts_from_bootstrap() {
        let bootstrap = 1_748_736_000_000; // 2025-06-01
        let now = T_1445;
        let (start, end) = sync_bounds(None, bootstrap, now).unwrap();
        assert_eq!(start, bootstrap);
        assert_eq!(end, T_1445);
    }

    #[test]
    fn up_to_date_storage_yields_no_window() {
        // Tail already at the current minute.
        let now = T_1445 + 12_345;
        assert!(sync_bounds(Some(T_1445), 0, now).is_none());
    }
}
