use std::env;
use std::path::PathBuf;

use cast_core::model::TrainConfig;

/// Predictor configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    // ── Storage ────────────────────────────────────────────────────
    pub db_path: PathBuf,
    pub db_pool_size: u32,

    // ── Model artifacts ────────────────────────────────────────────
    pub models_dir: PathBuf,

    // ── Scheduling ─────────────────────────────────────────────────
    /// Symbols to predict. Empty ⇒ every symbol storage knows.
    pub symbols: Vec<String>,
    pub validation_interval_secs: u64,

    // ── Training hyperparameters ───────────────────────────────────
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub hidden_units: usize,
    pub train_seed: u64,
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_symbols(name: &str) -> Vec<String> {
    env::var(name)
        .ok()
        .map(|s| {
            s.split(',')
                .map(|part| part.trim().to_ascii_uppercase())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl PredictorConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: PathBuf::from(env_str("CANDLECAST_DB", "candlecast.db")),
            db_pool_size: env_u32("CANDLECAST_DB_POOL", 4),
            models_dir: PathBuf::from(env_str("CANDLECAST_MODELS_DIR", "models")),
            symbols: env_symbols("CANDLECAST_SYMBOLS"),
            validation_interval_secs: env_u64("CANDLECAST_VALIDATION_INTERVAL_SECS", 5),
            epochs: env_usize("CANDLECAST_EPOCHS", 50),
            batch_size: env_usize("CANDLECAST_BATCH_SIZE", 32),
            learning_rate: env_f64("CANDLECAST_LEARNING_RATE", 1e-3),
            hidden_units: env_usize("CANDLECAST_HIDDEN_UNITS", 32),
            train_seed: env_u64("CANDLECAST_TRAIN_SEED", 17),
        }
    }

    /// Base training config; the per-horizon seed is derived from
    /// `train_seed` so repeated daily runs are reproducible.
    pub fn train_config(&self, horizon: u32) -> TrainConfig {
        TrainConfig {
            hidden: self.hidden_units,
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            seed: self.train_seed.wrapping_add(u64::from(horizon)),
        }
    }
}
