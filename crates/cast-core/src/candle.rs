use serde::{Deserialize, Serialize};

/// One-minute OHLCV bar for a trading pair.
///
/// Field names follow the upstream kline payload so rows round-trip
/// through storage and the query API unchanged. `open_time` is the
/// minute boundary in ms since epoch and is the unique key per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_asset_volume: f64,
    pub number_of_trades: i64,
    pub taker_buy_base_asset_volume: f64,
    pub taker_buy_quote_asset_volume: f64,
}

/// A predicted minute bar.
///
/// Same OHLCV shape as [`Candle`] plus provenance: when the inference
/// ran, which model set produced it, and which horizon covered this
/// minute of the hour block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub predicted_at: i64,
    pub model_version: String,
    pub minutes_ahead: u32,
}

/// Per-symbol storage statistics served by `/api/stats` and
/// `/api/symbols`. Timestamps are ms since epoch; the options are
/// `None` for an empty collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolStats {
    pub symbol: String,
    pub total_records: i64,
    pub first_record: Option<i64>,
    pub last_record: Option<i64>,
    pub last_price: Option<f64>,
}

/// True iff `low <= min(open, close) <= max(open, close) <= high`.
pub fn ohlc_sane(open: f64, high: f64, low: f64, close: f64) -> bool {
    low <= open.min(close) && high >= open.max(close)
}
