//! The fixed multi-horizon tables.
//!
//! Twelve models per symbol, one per horizon. The horizon intervals
//! partition the 60 minutes of a predicted hour exactly once; the
//! training window grows with the horizon.

/// Prediction horizons in minutes, ascending.
pub const HORIZONS: [u32; 12] = [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60];

/// Trailing-bucket sizes (minutes) for resampled features. Size 1 is
/// the raw minute row itself and is not listed.
pub const RESAMPLE_WINDOWS: [usize; 11] = [2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60];

/// Raw OHLCV columns per minute.
pub const BASE_FEATURES: usize = 5;

/// Full feature vector width: raw OHLCV plus one OHLCV block per
/// resample bucket size.
pub const FEATURE_WIDTH: usize = BASE_FEATURES * (1 + RESAMPLE_WINDOWS.len());

/// Model outputs: close_delta, high_delta, low_delta, volume.
pub const TARGET_WIDTH: usize = 4;

/// Largest training window; also the inference window length.
pub const MAX_TRAINING_WINDOW: usize = 8640;

/// Half-open interval `[start, end)` of minutes-ahead covered by a
/// horizon, or `None` for an unknown horizon.
pub fn interval(horizon: u32) -> Option<(usize, usize)> {
    let iv = match horizon {
        1 => (0, 1),
        2 => (1, 2),
        3 => (2, 3),
        4 => (3, 4),
        5 => (4, 5),
        6 => (5, 6),
        10 => (6, 10),
        12 => (10, 12),
        15 => (12, 15),
        20 => (15, 20),
        30 => (20, 30),
        60 => (30, 60),
        _ => return None,
    };
    Some(iv)
}

/// The horizon whose interval contains minute offset `k` of an hour
/// block.
pub fn horizon_for_minute(k: usize) -> u32 {
    assert!(k < 60, "minute offset {k} outside the hour block");
    for h in HORIZONS {
        let (start, end) = interval(h).unwrap();
        if k >= start && k < end {
            return h;
        }
    }
    unreachable!("horizon intervals partition [0, 60)")
}

/// Training window size W(h) in minutes.
pub fn training_window(horizon: u32) -> Option<usize> {
    let w = match horizon {
        1..=6 => 2880,
        10 | 12 | 15 => 4320,
        20 | 30 => 5760,
        60 => 8640,
        _ => return None,
    };
    Some(w)
}
