//! Supervised dataset construction for one horizon.
//!
//! Targets are deltas against the cut-off minute's close, not
//! absolute levels: for cut-off minute `t` the future candles in
//! `[t + start, t + end)` minutes (the horizon's interval) are
//! aggregated and compared against `close(t)`; volume is the plain
//! sum. One cut-off per minute of the window that still has `end`
//! minutes of future data available.

use ndarray::{s, Array2};

use crate::candle::Candle;
use crate::features::feature_matrix;
use crate::horizons::{interval, TARGET_WIDTH};

#[derive(Debug)]
pub struct Dataset {
    /// One row per sample, `FEATURE_WIDTH` columns.
    pub features: Array2<f64>,
    /// One row per sample: close_delta, high_delta, low_delta, volume.
    pub targets: Array2<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the (features, delta-targets) pair for `horizon` from a
/// contiguous ascending minute window. Returns `None` for an unknown
/// horizon or a window too short to yield a single sample.
pub fn supervised_dataset(candles: &[Candle], horizon: u32) -> Option<Dataset> {
    let (start, end) = interval(horizon)?;
    if candles.len() <= end {
        return None;
    }
    let samples = candles.len() - end;

    let all_features = feature_matrix(candles);
    let features = all_features.slice(s![..samples, ..]).to_owned();

    let mut targets = Array2::zeros((samples, TARGET_WIDTH));
    for i in 0..samples {
        let prev_close = candles[i].close;
        let future = &candles[i + start..i + end];

        let future_close = future.last().expect("interval is non-empty").close;
        let future_high = future.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let future_low = future.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let future_volume: f64 = future.iter().map(|c| c.volume).sum();

        targets[[i, 0]] = future_close - prev_close;
        targets[[i, 1]] = future_high - prev_close;
        targets[[i, 2]] = future_low - prev_close;
        targets[[i, 3]] = future_volume;
    }

    Some(Dataset { features, targets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::MINUTE_MS;

    fn candle(minute: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: minute * MINUTE_MS,
            open,
            high,
            low,
            close,
            volume,
            close_time: minute * MINUTE_MS + 59_999,
            quote_asset_volume: 0.0,
            number_of_trades: 0,
            taker_buy_base_asset_volume: 0.0,
            taker_buy_quote_asset_volume: 0.0,
        }
    }

    #[test]
    fn horizon_two_targets_by_hand() {
        // Minute i: close = 100 + i, high = close + 5, low = close - 5, vol = i + 1.
        let candles: Vec<Candle> = (0..6)
            .map(|i| {
                let c = 100.0 + i as f64;
                candle(i, c - 1.0, c + 5.0, c - 5.0, c, (i + 1) as f64)
            })
            .collect();

        // Horizon 2 → interval [1, 2): the single candle at t + 1.
        let ds = supervised_dataset(&candles, 2).unwrap();
        assert_eq!(ds.len(), 4);

        // Sample 0: prev_close = 100, future = minute 1.
        assert_eq!(ds.targets[[0, 0]], 1.0); // 101 - 100
        assert_eq!(ds.targets[[0, 1]], 6.0); // 106 - 100
        assert_eq!(ds.targets[[0, 2]], -4.0); // 96 - 100
        assert_eq!(ds.targets[[0, 3]], 2.0); // volume of minute 1
    }

    #[test]
    fn horizon_ten_aggregates_four_minutes() {
        let candles: Vec<Candle> = (0..16)
            .map(|i| {
                let c = 200.0 + i as f64;
                candle(i, c, c + 1.0, c - 1.0, c, 1.0)
            })
            .collect();

        // Horizon 10 → interval [6, 10): minutes t+6..t+9.
        let ds = supervised_dataset(&candles, 10).unwrap();
        assert_eq!(ds.len(), 6);

        // Sample 0: prev_close = 200, future closes 206..209.
        assert_eq!(ds.targets[[0, 0]], 9.0); // 209 - 200
        assert_eq!(ds.targets[[0, 1]], 10.0); // high 210 - 200
        assert_eq!(ds.targets[[0, 2]], 5.0); // low 205 - 200
        assert_eq!(ds.targets[[0, 3]], 4.0); // four minutes of volume
    }

    #[test]
    fn sample_count_is_window_minus_interval_end() {
        let candles: Vec<Candle> = (0..100)
            .map(|i| candle(i, 1.0, 2.0, 0.5, 1.5, 1.0))
            .collect();
        assert_eq!(supervised_dataset(&candles, 60).unwrap().len(), 40);
        assert_eq!(supervised_dataset(&candles, 1).unwrap().len(), 99);
        assert!(supervised_dataset(&candles[..60], 60).is_none());
        assert!(supervised_dataset(&candles, 7).is_none());
    }

    #[test]
    fn features_align_with_samples() {
        let candles: Vec<Candle> = (0..80)
            .map(|i| candle(i, 1.0, 2.0, 0.5, 1.5, 1.0))
            .collect();
        let ds = supervised_dataset(&candles, 30).unwrap();
        assert_eq!(ds.features.nrows(), ds.targets.nrows());
        assert_eq!(ds.features.ncols(), crate::horizons::FEATURE_WIDTH);
    }
}
