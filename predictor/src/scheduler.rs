//! Work detection for the continuous loop.
//!
//! Hours of the current UTC day are filled strictly in order: the
//! hour after the last predicted one, starting at 0 on a fresh day,
//! and never past the current wall-clock hour. One hour block per
//! symbol per tick keeps catch-up incremental and memory bounded.

/// The next hour-of-day to predict given the last one that already
/// has predictions today. `None` once the day is fully covered.
pub fn next_hour(last_predicted: Option<u32>) -> Option<u32> {
    match last_predicted {
        None => Some(0),
        Some(h) if h >= 23 => None,
        Some(h) => Some(h + 1),
    }
}
