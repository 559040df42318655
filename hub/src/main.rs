mod binance;
mod config;
mod error;
mod ingest;
mod routes;
mod state;
mod ws;

use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use binance::BinanceClient;
use cast_store::MarketStore;
use config::HubConfig;
use ingest::Ingestor;
use state::AppState;
use ws::broker::Broker;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = HubConfig::from_env();

    let store = match MarketStore::open(&cfg.db_path, cfg.db_pool_size) {
        Ok(store) => store,
        Err(e) => {
            error!("cannot open storage at {}: {e}", cfg.db_path.display());
            std::process::exit(1);
        }
    };
    // Configured symbols get their collections up front so the first
    // tick starts backfilling immediately.
    for symbol in &cfg.symbols {
        if let Err(e) = store.ensure_symbol(symbol) {
            error!("cannot prepare collection for {symbol}: {e}");
            std::process::exit(1);
        }
    }

    let client = match BinanceClient::new(&cfg) {
        Ok(client) => client,
        Err(e) => {
            error!("cannot build upstream client: {e}");
            std::process::exit(1);
        }
    };

    let (bus_tx, bus_rx) = broadcast::channel(256);
    let ingestor = Arc::new(Ingestor::new(store.clone(), client, bus_tx, &cfg));
    let broker = Broker::new(cfg.ws_queue_capacity);
    let state = AppState::new(store, broker, ingestor.clone());

    let cancel = CancellationToken::new();
    let ingest_task = tokio::spawn(ingestor.run(cancel.child_token()));
    let broadcaster_task = ws::spawn_broadcaster(state.clone(), bus_rx, cancel.child_token());

    let app = Router::new()
        .merge(routes::api_router())
        .route("/ws/updates", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.port)
        .parse()
        .expect("invalid bind address");
    info!("candlecast hub listening on http://{addr}");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("cannot bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {e}");
    }

    // The server is down; stop the background tasks and let the
    // in-flight ingest tick finish.
    cancel.cancel();
    let _ = ingest_task.await;
    let _ = broadcaster_task.await;
    info!("shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("shutdown signal received, stopping…");
}
