//! Hour-block emission.
//!
//! For hour block H the anchor is the real close of the minute just
//! before H. Features come from the window of real minutes ending at
//! H (exclusive); each horizon model turns them into one delta set,
//! and the 60 minute candles are chained so that every open equals
//! the previous close — real for minute 0, predicted afterwards.

use std::collections::HashMap;
use tracing::{debug, info};

use cast_core::candle::Prediction;
use cast_core::features::latest_features;
use cast_core::horizons::{horizon_for_minute, HORIZONS, MAX_TRAINING_WINDOW};
use cast_core::time::{hour_start_ms, now_ms, MINUTE_MS};
use cast_store::MarketStore;
use chrono::NaiveDate;

use crate::error::PredictorError;
use crate::models::ModelSet;

/// close_delta, high_delta, low_delta, volume.
pub type Deltas = [f64; 4];

/// Chain the 60 minute predictions of one hour block from the anchor
/// close and one delta set per horizon. Continuity holds by
/// construction; the high/low are clamped to stay OHLC-sane and
/// volume is floored at zero.
pub fn assemble_hour(
    hour_start: i64,
    prev_real_close: f64,
    deltas: &HashMap<u32, Deltas>,
    predicted_at: i64,
    model_version: &str,
) -> Vec<Prediction> {
    let mut out = Vec::with_capacity(60);
    let mut prev_close = prev_real_close;

    for k in 0..60usize {
        let horizon = horizon_for_minute(k);
        let d = deltas[&horizon];

        let open = prev_close;
        let close = prev_close + d[0];
        let high = (prev_close + d[1]).max(open).max(close);
        let low = (prev_close + d[2]).min(open).min(close);
        let volume = d[3].max(0.0);
        let open_time = hour_start + k as i64 * MINUTE_MS;

        out.push(Prediction {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time: open_time + MINUTE_MS - 1,
            predicted_at,
            model_version: model_version.to_string(),
            minutes_ahead: horizon,
        });

        prev_close = close;
    }

    out
}

/// Produce and persist the hour block for (`symbol`, `date`, `hour`).
/// Returns how many documents were newly inserted (re-runs hit the
/// unique key and insert nothing).
pub fn predict_hour(
    store: &MarketStore,
    set: &ModelSet,
    symbol: &str,
    date: NaiveDate,
    hour: u32,
) -> Result<usize, PredictorError> {
    let hour_start = hour_start_ms(date, hour);

    // Anchor: the last real minute before the block.
    let anchor = store
        .candle_at(symbol, hour_start - MINUTE_MS)?
        .ok_or(PredictorError::InsufficientData {
            needed: 1,
            have: 0,
        })?;

    // Feature window: real minutes ending at H, exclusive.
    let window_start = hour_start - MAX_TRAINING_WINDOW as i64 * MINUTE_MS;
    let window = store.candles_range(
        symbol,
        Some(window_start),
        Some(hour_start - MINUTE_MS),
        None,
    )?;
    if window.len() < MAX_TRAINING_WINDOW {
        return Err(PredictorError::InsufficientData {
            needed: MAX_TRAINING_WINDOW,
            have: window.len(),
        });
    }

    let features = latest_features(&window);

    // One delta set per horizon; every minute in I(h) shares it.
    let mut deltas: HashMap<u32, Deltas> = HashMap::new();
    for h in HORIZONS {
        let artifacts = set
            .horizons
            .get(&h)
            .ok_or_else(|| PredictorError::Artifacts(format!("missing horizon {h} model")))?;
        let scaled = artifacts.scalers.features.transform_row(features.view());
        let raw = artifacts.model.predict(&scaled);
        let d = artifacts.scalers.targets.inverse_row(raw.view());
        deltas.insert(h, [d[0], d[1], d[2], d[3]]);
        debug!(symbol, horizon = h, close_delta = d[0], "horizon deltas");
    }

    let block = assemble_hour(hour_start, anchor.close, &deltas, now_ms(), &set.date_tag);
    let inserted = store.insert_predictions(symbol, &block)?;

    info!(symbol, hour, inserted, "hour block persisted");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cast_core::candle::ohlc_sane;

    fn uniform_deltas(d: Deltas) -> HashMap<u32, Deltas> {
        HORIZONS.iter().map(|&h| (h, d)).collect()
    }

    #[test]
    fn first_two_minutes_match_the_delta_arithmetic() {
        // Real close 42_000.00 at the minute before the block.
        let mut deltas = uniform_deltas([0.0, 0.0, 0.0, 0.0]);
        deltas.insert(1, [10.0, 25.0, -15.0, 100.0]);
        deltas.insert(2, [-5.0, 3.0, -7.0, 50.0]);

        let block = assemble_hour(0, 42_000.0, &deltas, 999, "20251117");

        let first = &block[0];
        assert_eq!(first.open, 42_000.0);
        assert_eq!(first.close, 42_010.0);
        assert_eq!(first.high, 42_025.0);
        assert_eq!(first.low, 41_985.0);
        assert_eq!(first.volume, 100.0);
        assert_eq!(first.minutes_ahead, 1);

        let second = &block[1];
        assert_eq!(second.open, 42_010.0);
        assert_eq!(second.close, 42_005.0);
        assert_eq!(second.high, 42_013.0);
        assert_eq!(second.low, 42_003.0);
        assert_eq!(second.volume, 50.0);
        assert_eq!(second.minutes_ahead, 2);
    }

    #[test]
    fn the_chain_is_continuous_for_the_whole_hour() {
        let deltas = uniform_deltas([1.5, 2.0, -2.0, 10.0]);
        let block = assemble_hour(3_600_000, 100.0, &deltas, 1, "20251117");

        assert_eq!(block.len(), 60);
        assert_eq!(block[0].open, 100.0);
        for k in 1..60 {
            assert_eq!(block[k].open, block[k - 1].close);
        }
        for (k, p) in block.iter().enumerate() {
            assert_eq!(p.open_time, 3_600_000 + k as i64 * MINUTE_MS);
            assert_eq!(p.close_time, p.open_time + MINUTE_MS - 1);
        }
    }

    #[test]
    fn pathological_deltas_still_yield_sane_candles() {
        // High delta below the move, low delta above it, negative volume.
        let deltas = uniform_deltas([50.0, -10.0, 20.0, -5.0]);
        let block = assemble_hour(0, 1_000.0, &deltas, 1, "20251117");

        for p in &block {
            assert!(ohlc_sane(p.open, p.high, p.low, p.close));
            assert!(p.volume >= 0.0);
        }
        assert_eq!(block[0].high, 1_050.0); // clamped up to the close
        assert_eq!(block[0].low, 1_000.0); // clamped down to the open
    }

    #[test]
    fn minutes_ahead_follows_the_partition() {
        let deltas = uniform_deltas([0.0, 0.0, 0.0, 0.0]);
        let block = assemble_hour(0, 1.0, &deltas, 1, "20251117");
        assert_eq!(block[0].minutes_ahead, 1);
        assert_eq!(block[6].minutes_ahead, 10);
        assert_eq!(block[11].minutes_ahead, 12);
        assert_eq!(block[35].minutes_ahead, 60);
        assert_eq!(block[59].minutes_ahead, 60);
    }

    /// Full pipeline: seed real minutes, train a (tiny) model set,
    /// emit the hour block, and check anchoring plus idempotence.
    #[test]
    fn emitted_block_is_anchored_and_idempotent() {
        use crate::config::PredictorConfig;
        use crate::training::train_model_set;
        use cast_core::candle::Candle;
        use cast_core::horizons::MAX_TRAINING_WINDOW;

        let dir = tempfile::tempdir().unwrap();
        let store = MarketStore::open(&dir.path().join("m.db"), 2).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 11, 17).unwrap();
        let hour = 10u32;
        let hour_start = hour_start_ms(date, hour);

        // Real minutes through the end of the hour before H, deep
        // enough for the largest training window one hour earlier.
        let count = MAX_TRAINING_WINDOW + 60;
        let first = hour_start - count as i64 * MINUTE_MS;
        let candles: Vec<Candle> = (0..count as i64)
            .map(|i| {
                let t = first + i * MINUTE_MS;
                let base = 500.0 + ((i % 23) as f64) * 0.5;
                Candle {
                    open_time: t,
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base + 0.5,
                    volume: 2.0,
                    close_time: t + 59_999,
                    quote_asset_volume: 0.0,
                    number_of_trades: 1,
                    taker_buy_base_asset_volume: 0.0,
                    taker_buy_quote_asset_volume: 0.0,
                }
            })
            .collect();
        store.upsert_candles("BTCUSDT", &candles).unwrap();

        let mut cfg = PredictorConfig::from_env();
        cfg.epochs = 1;
        cfg.hidden_units = 4;
        cfg.batch_size = 256;
        let set = train_model_set(&store, &cfg, "BTCUSDT", date).unwrap();
        assert_eq!(set.horizons.len(), HORIZONS.len());

        let inserted = predict_hour(&store, &set, "BTCUSDT", date, hour).unwrap();
        assert_eq!(inserted, 60);

        let block = store
            .predictions_range("BTCUSDT", Some(hour_start), None, None)
            .unwrap();
        assert_eq!(block.len(), 60);

        // Anchored on the real close of the minute before H.
        let anchor = store.candle_at("BTCUSDT", hour_start - MINUTE_MS).unwrap().unwrap();
        assert_eq!(block[0].open, anchor.close);
        for k in 1..60 {
            assert_eq!(block[k].open, block[k - 1].close);
        }
        assert!(block.iter().all(|p| p.model_version == set.date_tag));

        // Re-running the same hour writes nothing new.
        assert_eq!(predict_hour(&store, &set, "BTCUSDT", date, hour).unwrap(), 0);
        assert!(store.hour_has_prediction("BTCUSDT", date, hour).unwrap());
        assert_eq!(
            store.last_predicted_hour_today("BTCUSDT", date).unwrap(),
            Some(hour)
        );
    }
}
