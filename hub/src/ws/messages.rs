//! Wire messages for `/ws/updates`, tagged by `action` (client) and
//! `type` (server).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ingest::SyncEvent;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(default)]
        symbols: Vec<String>,
    },
    Unsubscribe {
        #[serde(default)]
        symbols: Vec<String>,
    },
    Ping,
    Stats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatistics {
    pub new_records: usize,
    pub total_records: i64,
    pub last_price: Option<f64>,
    pub last_record: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerStats {
    pub total_connections: usize,
    pub subscriptions: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        message: String,
        timestamp: i64,
    },
    Subscribed {
        symbols: Vec<String>,
        timestamp: i64,
    },
    Unsubscribed {
        symbols: Vec<String>,
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
    SyncComplete {
        symbol: String,
        timestamp: i64,
        statistics: SyncStatistics,
    },
    Stats {
        data: BrokerStats,
        timestamp: i64,
    },
    Error {
        message: String,
        timestamp: i64,
    },
}

impl ServerMessage {
    pub fn sync_complete(event: &SyncEvent, timestamp: i64) -> Self {
        Self::SyncComplete {
            symbol: event.symbol.clone(),
            timestamp,
            statistics: SyncStatistics {
                new_records: event.new_records,
                total_records: event.total_records,
                last_price: event.last_price,
                last_record: event.last_record,
            },
        }
    }

    pub fn error(message: impl Into<String>, timestamp: i64) -> Self {
        Self::Error {
            message: message.into(),
            timestamp,
        }
    }

    pub fn json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
