use std::sync::Arc;

use cast_store::MarketStore;

use crate::ingest::Ingestor;
use crate::ws::broker::Broker;

/// Shared application state, passed to all route handlers via
/// `axum::extract::State`.
pub struct AppState {
    pub store: MarketStore,
    pub broker: Broker,
    pub ingestor: Arc<Ingestor>,
}

impl AppState {
    pub fn new(store: MarketStore, broker: Broker, ingestor: Arc<Ingestor>) -> Arc<Self> {
        Arc::new(Self {
            store,
            broker,
            ingestor,
        })
    }
}
