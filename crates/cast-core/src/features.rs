//! Resampled feature assembly.
//!
//! Each minute yields a 60-wide vector: its raw OHLCV plus, for every
//! bucket size in [`RESAMPLE_WINDOWS`], the OHLCV aggregate of the
//! trailing bucket. Buckets are aligned to epoch minutes (every size
//! divides 60, so hour-aligned windows start on a bucket boundary).
//! A bucket's aggregate becomes available at the bucket's final
//! minute and is carried forward until the next bucket completes;
//! before the first completion the partial aggregate accumulated so
//! far is used.

use ndarray::{Array1, Array2};

use crate::candle::Candle;
use crate::horizons::{FEATURE_WIDTH, RESAMPLE_WINDOWS};
use crate::time::MINUTE_MS;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Bucket {
    fn start(c: &Candle) -> Self {
        Self {
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
        }
    }

    fn absorb(&mut self, c: &Candle) {
        self.high = self.high.max(c.high);
        self.low = self.low.min(c.low);
        self.close = c.close;
        self.volume += c.volume;
    }
}

/// Build the full feature matrix for a contiguous ascending minute
/// series: one row per candle, [`FEATURE_WIDTH`] columns.
pub fn feature_matrix(candles: &[Candle]) -> Array2<f64> {
    let n = candles.len();
    let mut out = Array2::zeros((n, FEATURE_WIDTH));

    for (i, c) in candles.iter().enumerate() {
        out[[i, 0]] = c.open;
        out[[i, 1]] = c.high;
        out[[i, 2]] = c.low;
        out[[i, 3]] = c.close;
        out[[i, 4]] = c.volume;
    }

    for (w_idx, &size) in RESAMPLE_WINDOWS.iter().enumerate() {
        let col = (w_idx + 1) * 5;
        let mut current: Option<Bucket> = None;
        let mut complete: Option<Bucket> = None;

        for (i, c) in candles.iter().enumerate() {
            let minute = c.open_time.div_euclid(MINUTE_MS);
            let pos = minute.rem_euclid(size as i64) as usize;

            if pos == 0 {
                current = Some(Bucket::start(c));
            } else if let Some(bucket) = current.as_mut() {
                bucket.absorb(c);
            } else {
                // Series began mid-bucket; start from what we have.
                current = Some(Bucket::start(c));
            }
            if pos == size - 1 {
                complete = current.take();
            }

            let carried = complete
                .as_ref()
                .or(current.as_ref())
                .expect("bucket state exists after absorbing a candle");
            out[[i, col]] = carried.open;
            out[[i, col + 1]] = carried.high;
            out[[i, col + 2]] = carried.low;
            out[[i, col + 3]] = carried.close;
            out[[i, col + 4]] = carried.volume;
        }
    }

    out
}

/// Feature vector of the most recent minute in the series.
pub fn latest_features(candles: &[Candle]) -> Array1<f64> {
    let matrix = feature_matrix(candles);
    let last = matrix.nrows() - 1;
    matrix.row(last).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horizons::BASE_FEATURES;

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

    fn series(start_minute: i64, n: usize) -> Vec<Candle> {
        (0..n as i64)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(start_minute + i, base, base + 2.0, base - 2.0, base + 1.0, 10.0)
            })
            .collect()
    }

    #[test]
    fn raw_columns_mirror_the_candle() {
        let candles = series(0, 4);
        let m = feature_matrix(&candles);
        assert_eq!(m.shape(), &[4, FEATURE_WIDTH]);
        assert_eq!(m[[2, 0]], 102.0);
        assert_eq!(m[[2, 1]], 104.0);
        assert_eq!(m[[2, 2]], 100.0);
        assert_eq!(m[[2, 3]], 103.0);
        assert_eq!(m[[2, 4]], 10.0);
    }

    #[test]
    fn two_minute_bucket_completes_and_carries() {
        let candles = series(0, 5);
        let m = feature_matrix(&candles);
        let col = BASE_FEATURES; // bucket size 2 block

        // Minute 0: bucket [0,2) not complete yet, partial aggregate.
        assert_eq!(m[[0, col]], 100.0); // open
        assert_eq!(m[[0, col + 3]], 101.0); // close
        assert_eq!(m[[0, col + 4]], 10.0); // volume

        // Minute 1: bucket [0,2) completes here.
        assert_eq!(m[[1, col]], 100.0);
        assert_eq!(m[[1, col + 1]], 103.0); // max(high0, high1)
        assert_eq!(m[[1, col + 2]], 98.0); // min(low0, low1)
        assert_eq!(m[[1, col + 3]], 102.0); // close of minute 1
        assert_eq!(m[[1, col + 4]], 20.0); // summed volume

        // Minute 2: carries the completed [0,2) bucket.
        assert_eq!(m[[2, col]], 100.0);
        assert_eq!(m[[2, col + 3]], 102.0);
        assert_eq!(m[[2, col + 4]], 20.0);

        // Minute 3: bucket [2,4) completes.
        assert_eq!(m[[3, col]], 102.0);
        assert_eq!(m[[3, col + 3]], 104.0);
        assert_eq!(m[[3, col + 4]], 20.0);
    }

    #[test]
    fn buckets_align_to_epoch_not_window_start() {
        // Series starting mid-bucket for size 2: minute 1 closes the
        // epoch bucket [0,2) even though minute 0 is absent.
        let candles = series(1, 3);
        let m = feature_matrix(&candles);
        let col = BASE_FEATURES;

        // Minute 1 ends bucket [0,2); only minute 1 was available.
        assert_eq!(m[[0, col]], 100.0);
        assert_eq!(m[[0, col + 4]], 10.0);
        // Minute 2 carries it; minute 3 completes [2,4).
        assert_eq!(m[[1, col + 3]], 101.0);
        assert_eq!(m[[2, col]], 101.0);
        assert_eq!(m[[2, col + 4]], 20.0);
    }

    #[test]
    fn hour_bucket_stays_partial_within_first_hour() {
        let candles = series(0, 30);
        let m = feature_matrix(&candles);
        let col = BASE_FEATURES * RESAMPLE_WINDOWS.len(); // size-60 block
        // No 60-minute bucket has completed: partial from minute 0.
        assert_eq!(m[[29, col]], 100.0);
        assert_eq!(m[[29, col + 3]], 130.0);
        assert_eq!(m[[29, col + 4]], 300.0);
    }

    #[test]
    fn latest_features_is_last_row() {
        let candles = series(0, 130);
        let m = feature_matrix(&candles);
        let last = latest_features(&candles);
        assert_eq!(last.len(), FEATURE_WIDTH);
        for j in 0..FEATURE_WIDTH {
            assert_eq!(last[j], m[[129, j]]);
        }
    }
}
