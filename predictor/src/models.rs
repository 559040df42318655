//! Model artifact lifecycle.
//!
//! Per (symbol, horizon, UTC date) three JSON artifacts live under
//! `{models_dir}/{symbol}/`: the network weights, the normalization
//! descriptors, and training metadata. File names encode only the
//! date (`YYYYMMDD`), so tag equality against today decides validity;
//! a set is valid only when all 12 horizons have all three files.
//! Writes land in a `.tmp` sibling first and are renamed into place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use cast_core::horizons::HORIZONS;
use cast_core::model::{HorizonModel, TrainReport};
use cast_core::scaler::MinMaxScaler;
use cast_core::time::{date_tag, parse_date_tag};
use chrono::NaiveDate;

use crate::error::PredictorError;

/// Separate feature/target normalization descriptors for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerPair {
    pub features: MinMaxScaler,
    pub targets: MinMaxScaler,
}

/// Training provenance stored next to the weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMeta {
    pub symbol: String,
    pub horizon: u32,
    pub date_tag: String,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
    pub trained_at_ms: i64,
    pub report: TrainReport,
}

pub struct HorizonArtifacts {
    pub model: HorizonModel,
    pub scalers: ScalerPair,
    pub meta: ModelMeta,
}

/// The 12 horizon models of one symbol for one UTC date.
pub struct ModelSet {
    pub date_tag: String,
    pub horizons: HashMap<u32, HorizonArtifacts>,
}

pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    pub fn new(models_dir: PathBuf) -> Self {
        Self { models_dir }
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.models_dir.join(symbol.to_ascii_lowercase())
    }

    fn artifact_paths(&self, symbol: &str, horizon: u32, tag: &str) -> [PathBuf; 3] {
        let dir = self.symbol_dir(symbol);
        let sym = symbol.to_ascii_lowercase();
        [
            dir.join(format!("model_{sym}_h{horizon}_{tag}.json")),
            dir.join(format!("scaler_{sym}_h{horizon}_{tag}.json")),
            dir.join(format!("meta_{sym}_h{horizon}_{tag}.json")),
        ]
    }

    /// Load the set tagged with `today` if it is complete; `None`
    /// when any horizon is missing an artifact or fails to parse.
    pub fn load_valid_set(
        &self,
        symbol: &str,
        today: NaiveDate,
    ) -> Result<Option<ModelSet>, PredictorError> {
        let tag = date_tag(today);
        let mut horizons = HashMap::new();

        for h in HORIZONS {
            let [model_path, scaler_path, meta_path] = self.artifact_paths(symbol, h, &tag);
            if !model_path.exists() || !scaler_path.exists() || !meta_path.exists() {
                return Ok(None);
            }
            let model: HorizonModel = match read_json(&model_path) {
                Ok(m) => m,
                Err(e) => {
                    warn!(symbol, horizon = h, "unreadable model artifact, will retrain: {e}");
                    return Ok(None);
                }
            };
            let scalers: ScalerPair = match read_json(&scaler_path) {
                Ok(s) => s,
                Err(e) => {
                    warn!(symbol, horizon = h, "unreadable scaler artifact, will retrain: {e}");
                    return Ok(None);
                }
            };
            let meta: ModelMeta = match read_json(&meta_path) {
                Ok(m) => m,
                Err(e) => {
                    warn!(symbol, horizon = h, "unreadable meta artifact, will retrain: {e}");
                    return Ok(None);
                }
            };
            horizons.insert(
                h,
                HorizonArtifacts {
                    model,
                    scalers,
                    meta,
                },
            );
        }

        Ok(Some(ModelSet {
            date_tag: tag,
            horizons,
        }))
    }

    /// Delete every artifact of this symbol whose date tag differs
    /// from `today`. Returns how many files went away.
    pub fn delete_stale(&self, symbol: &str, today: NaiveDate) -> Result<usize, PredictorError> {
        let dir = self.symbol_dir(symbol);
        if !dir.exists() {
            return Ok(0);
        }
        let keep = date_tag(today);
        let mut removed = 0usize;

        let entries = fs::read_dir(&dir)
            .map_err(|e| PredictorError::Artifacts(format!("read {}: {e}", dir.display())))?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(tag) = artifact_date_tag(&name) else {
                continue;
            };
            if tag != keep {
                match fs::remove_file(entry.path()) {
                    Ok(()) => {
                        removed += 1;
                        debug!(symbol, file = %name, "stale artifact removed");
                    }
                    Err(e) => warn!(symbol, file = %name, "cannot remove stale artifact: {e}"),
                }
            }
        }
        Ok(removed)
    }

    /// Persist a freshly trained set: every file staged then renamed.
    pub fn save_set(&self, symbol: &str, set: &ModelSet) -> Result<(), PredictorError> {
        let dir = self.symbol_dir(symbol);
        fs::create_dir_all(&dir)
            .map_err(|e| PredictorError::Artifacts(format!("create {}: {e}", dir.display())))?;

        for (h, artifacts) in &set.horizons {
            let [model_path, scaler_path, meta_path] =
                self.artifact_paths(symbol, *h, &set.date_tag);
            write_json_atomic(&model_path, &artifacts.model)?;
            write_json_atomic(&scaler_path, &artifacts.scalers)?;
            write_json_atomic(&meta_path, &artifacts.meta)?;
        }
        Ok(())
    }
}

/// `model_btcusdt_h10_20251117.json` → `20251117`.
fn artifact_date_tag(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".json")?;
    if !(stem.starts_with("model_") || stem.starts_with("scaler_") || stem.starts_with("meta_")) {
        return None;
    }
    let tag = stem.rsplit('_').next()?;
    parse_date_tag(tag).map(|_| tag.to_string())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PredictorError> {
    let bytes = fs::read(path)
        .map_err(|e| PredictorError::Artifacts(format!("read {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PredictorError::Artifacts(format!("parse {}: {e}", path.display())))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PredictorError> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| PredictorError::Artifacts(format!("encode {}: {e}", path.display())))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)
        .map_err(|e| PredictorError::Artifacts(format!("stage {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| PredictorError::Artifacts(format!("rename {}: {e}", path.display())))
}
