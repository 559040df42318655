mod config;
mod error;
mod inference;
mod models;
mod scheduler;
mod service;
mod training;

use anyhow::Context;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cast_store::MarketStore;
use config::PredictorConfig;
use models::ModelManager;
use service::PredictionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = PredictorConfig::from_env();
    let store = MarketStore::open(&cfg.db_path, cfg.db_pool_size)
        .with_context(|| format!("cannot open storage at {}", cfg.db_path.display()))?;
    let manager = ModelManager::new(cfg.models_dir.clone());

    info!(
        db = %cfg.db_path.display(),
        models = %cfg.models_dir.display(),
        interval_secs = cfg.validation_interval_secs,
        "candlecast predictor starting"
    );

    let service = PredictionService::new(store, manager, cfg.clone());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received, stopping…");
                cancel.cancel();
            }
        });
    }

    // The validation cadence is a ceiling, not a floor: a tick runs
    // to completion (training included) before the next sleep.
    let mut ticker =
        tokio::time::interval(Duration::from_secs(cfg.validation_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => service.tick(&cancel).await,
        }
    }

    info!("predictor stopped");
    Ok(())
}
