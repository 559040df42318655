//! Domain types and numeric core shared by the candlecast services.
//!
//! The hub depends on the candle/time halves; the predictor additionally
//! uses the feature, dataset, scaler and model modules.

pub mod candle;
pub mod dataset;
pub mod features;
pub mod horizons;
pub mod model;
pub mod scaler;
pub mod time;

pub use candle::{Candle, Prediction, SymbolStats};
