//! Daily training of one symbol's 12-horizon model set.
//!
//! The reference boundary T₀ is the most recent UTC hour boundary at
//! or below the latest real candle. Each horizon trains on the
//! contiguous minutes `[T₀ − W(h), T₀)` — exactly W(h) of them or
//! nothing. The whole set trains or the whole attempt fails; partial
//! sets are never persisted.

use std::collections::HashMap;
use tracing::{debug, info};

use cast_core::candle::Candle;
use cast_core::dataset::supervised_dataset;
use cast_core::horizons::{training_window, HORIZONS};
use cast_core::model::HorizonModel;
use cast_core::scaler::MinMaxScaler;
use cast_core::time::{date_tag, floor_hour, now_ms, MINUTE_MS};
use cast_store::MarketStore;
use chrono::NaiveDate;

use crate::config::PredictorConfig;
use crate::error::PredictorError;
use crate::models::{HorizonArtifacts, ModelMeta, ModelSet, ScalerPair};

/// Train all 12 horizon models for `symbol`, tagged with `today`.
pub fn train_model_set(
    store: &MarketStore,
    cfg: &PredictorConfig,
    symbol: &str,
    today: NaiveDate,
) -> Result<ModelSet, PredictorError> {
    let last = store
        .last_candle(symbol)?
        .ok_or(PredictorError::InsufficientData { needed: 1, have: 0 })?;
    let reference = floor_hour(last.open_time);
    let tag = date_tag(today);

    info!(symbol, reference_ms = reference, tag = %tag, "training model set");

    let mut horizons = HashMap::new();
    for h in HORIZONS {
        let window = training_window(h).expect("known horizon");
        let candles = load_exact_window(store, symbol, reference, window)?;
        horizons.insert(h, train_horizon(cfg, symbol, &tag, h, reference, &candles)?);
    }

    Ok(ModelSet {
        date_tag: tag,
        horizons,
    })
}

/// The contiguous minutes `[reference − window, reference)`; fails
/// unless exactly `window` of them exist.
fn load_exact_window(
    store: &MarketStore,
    symbol: &str,
    reference_ms: i64,
    window: usize,
) -> Result<Vec<Candle>, PredictorError> {
    let start = reference_ms - window as i64 * MINUTE_MS;
    let candles = store.candles_range(symbol, Some(start), Some(reference_ms - MINUTE_MS), None)?;
    if candles.len() != window {
        return Err(PredictorError::InsufficientData {
            needed: window,
            have: candles.len(),
        });
    }
    Ok(candles)
}

fn train_horizon(
    cfg: &PredictorConfig,
    symbol: &str,
    tag: &str,
    horizon: u32,
    reference_ms: i64,
    candles: &[Candle],
) -> Result<HorizonArtifacts, PredictorError> {
    let dataset = supervised_dataset(candles, horizon).ok_or(PredictorError::InsufficientData {
        needed: candles.len() + 1,
        have: candles.len(),
    })?;

    let feature_scaler = MinMaxScaler::fit(&dataset.features);
    let target_scaler = MinMaxScaler::fit(&dataset.targets);
    let x = feature_scaler.transform(&dataset.features);
    let y = target_scaler.transform(&dataset.targets);

    let train_cfg = cfg.train_config(horizon);
    let (model, report) = HorizonModel::train(&x, &y, &train_cfg);

    debug!(
        symbol,
        horizon,
        samples = dataset.len(),
        final_loss = report.final_loss,
        "horizon model fitted"
    );

    Ok(HorizonArtifacts {
        model,
        scalers: ScalerPair {
            features: feature_scaler,
            targets: target_scaler,
        },
        meta: ModelMeta {
            symbol: symbol.to_ascii_uppercase(),
            horizon,
            date_tag: tag.to_string(),
            window_start_ms: reference_ms - candles.len() as i64 * MINUTE_MS,
            window_end_ms: reference_ms,
            trained_at_ms: now_ms(),
            report,
        },
    })
}
