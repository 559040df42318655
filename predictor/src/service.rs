//! The per-tick orchestration: gates, model lifecycle, emission.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cast_core::time::{now_ms, utc_date, utc_hour};
use cast_store::MarketStore;
use chrono::NaiveDate;

use crate::config::PredictorConfig;
use crate::error::PredictorError;
use crate::inference::predict_hour;
use crate::models::{ModelManager, ModelSet};
use crate::scheduler::next_hour;
use crate::training::train_model_set;

/// What happened to one symbol during a tick.
#[derive(Debug)]
enum Outcome {
    /// All 24 hours of today are already covered.
    DayComplete,
    /// Next hour is still in the future; nothing to do yet.
    UpToDate,
    /// Duplicate guard hit; another pass already wrote this hour.
    AlreadyPredicted(u32),
    /// Real data does not cover the hour yet.
    WaitingForData(u32),
    Emitted { hour: u32, inserted: usize },
}

pub struct PredictionService {
    store: MarketStore,
    manager: ModelManager,
    cfg: PredictorConfig,
}

impl PredictionService {
    pub fn new(store: MarketStore, manager: ModelManager, cfg: PredictorConfig) -> Self {
        Self {
            store,
            manager,
            cfg,
        }
    }

    /// One validation pass over every symbol, sequentially. Training
    /// is the slow path and runs at most once per symbol per UTC day.
    pub async fn tick(&self, cancel: &CancellationToken) {
        let symbols = if self.cfg.symbols.is_empty() {
            match self.store.known_symbols() {
                Ok(list) => list,
                Err(e) => {
                    warn!("cannot enumerate symbols: {e}");
                    return;
                }
            }
        } else {
            self.cfg.symbols.clone()
        };

        for symbol in &symbols {
            if cancel.is_cancelled() {
                break;
            }
            match self.process_symbol(symbol) {
                Ok(Outcome::Emitted { hour, inserted }) => {
                    info!(symbol = %symbol, hour, inserted, "prediction block emitted");
                }
                Ok(Outcome::WaitingForData(hour)) => {
                    debug!(symbol = %symbol, hour, "waiting for real data");
                }
                Ok(outcome) => debug!(symbol = %symbol, ?outcome, "nothing to do"),
                Err(e) if e.is_insufficient_data() => {
                    debug!(symbol = %symbol, "skipping hour: {e}");
                }
                Err(e) => warn!(symbol = %symbol, "prediction pass failed: {e}"),
            }
        }
    }

    fn process_symbol(&self, symbol: &str) -> Result<Outcome, PredictorError> {
        let now = now_ms();
        let today = utc_date(now);
        let current_hour = utc_hour(now);

        let last = self.store.last_predicted_hour_today(symbol, today)?;
        let Some(hour) = next_hour(last) else {
            return Ok(Outcome::DayComplete);
        };
        if hour > current_hour {
            return Ok(Outcome::UpToDate);
        }
        if self.store.hour_has_prediction(symbol, today, hour)? {
            return Ok(Outcome::AlreadyPredicted(hour));
        }
        if !self.store.real_data_covers(symbol, today, hour)? {
            return Ok(Outcome::WaitingForData(hour));
        }

        let set = self.acquire_model_set(symbol, today)?;
        let inserted = predict_hour(&self.store, &set, symbol, today, hour)?;
        Ok(Outcome::Emitted { hour, inserted })
    }

    /// Fast path: today's set loads from disk. Slow path: stale sets
    /// are deleted, a fresh set is trained and persisted.
    fn acquire_model_set(
        &self,
        symbol: &str,
        today: NaiveDate,
    ) -> Result<ModelSet, PredictorError> {
        if let Some(set) = self.manager.load_valid_set(symbol, today)? {
            debug!(symbol, tag = %set.date_tag, "model set loaded");
            return Ok(set);
        }

        let removed = self.manager.delete_stale(symbol, today)?;
        if removed > 0 {
            info!(symbol, removed, "stale model artifacts deleted");
        }

        let set = train_model_set(&self.store, &self.cfg, symbol, today)?;
        self.manager.save_set(symbol, &set)?;
        info!(symbol, tag = %set.date_tag, "model set trained and persisted");
        Ok(set)
    }
}
