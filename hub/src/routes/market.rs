//! The HTTP query surface over stored candles and predictions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::HubError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/symbols", get(api_symbols))
        .route("/api/sync", post(api_sync))
        .route("/api/data/{symbol}", get(api_data))
        .route("/api/predictions/{symbol}", get(api_predictions))
        .route("/api/stats/{symbol}", get(api_stats))
}

/// Raw query params; parsed by hand so malformed numbers produce the
/// typed 400 body instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    start_time: Option<String>,
    end_time: Option<String>,
    limit: Option<String>,
}

struct Range {
    start: Option<i64>,
    end: Option<i64>,
    limit: Option<u32>,
}

fn parse_range(q: &RangeQuery) -> Result<Range, HubError> {
    fn num<T: std::str::FromStr>(name: &str, raw: &Option<String>) -> Result<Option<T>, HubError> {
        match raw {
            None => Ok(None),
            Some(s) => s.trim().parse::<T>().map(Some).map_err(|_| {
                HubError::BadRequest(format!("{name} must be a number, got {s:?}"))
            }),
        }
    }
    Ok(Range {
        start: num("start_time", &q.start_time)?,
        end: num("end_time", &q.end_time)?,
        limit: num("limit", &q.limit)?,
    })
}

/// GET /health — liveness plus a storage probe.
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    if state.store.ping() {
        (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": "candlecast-hub",
                "database": "connected",
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "candlecast-hub",
                "database": "disconnected",
                "error": "storage ping failed",
            })),
        )
    }
}

/// GET /api/symbols — every symbol with data, plus its statistics.
async fn api_symbols(State(state): State<Arc<AppState>>) -> Result<Json<Value>, HubError> {
    let symbols = state.store.all_stats()?;
    Ok(Json(json!({
        "success": true,
        "count": symbols.len(),
        "symbols": symbols,
    })))
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    #[serde(default)]
    symbol: String,
}

/// POST /api/sync — one-shot ingest for a single symbol.
async fn api_sync(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<Value>, HubError> {
    let symbol = req.symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(HubError::BadRequest("the symbol field is required".to_string()));
    }
    let report = state.ingestor.sync_symbol(&symbol).await?;
    Ok(Json(json!({
        "success": true,
        "symbol": symbol,
        "new_records": report.new_records,
        "statistics": report.stats,
    })))
}

/// GET /api/data/{symbol} — stored candles, optionally bounded.
async fn api_data(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Value>, HubError> {
    let symbol = symbol.to_ascii_uppercase();
    let range = parse_range(&q)?;
    let data = state
        .store
        .candles_range(&symbol, range.start, range.end, range.limit)?;
    Ok(Json(json!({
        "success": true,
        "symbol": symbol,
        "count": data.len(),
        "data": data,
    })))
}

/// GET /api/predictions/{symbol} — the forecast series.
async fn api_predictions(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Value>, HubError> {
    let symbol = symbol.to_ascii_uppercase();
    let range = parse_range(&q)?;
    let data = state
        .store
        .predictions_range(&symbol, range.start, range.end, range.limit)?;
    Ok(Json(json!({
        "success": true,
        "symbol": symbol,
        "count": data.len(),
        "data": data,
    })))
}

/// GET /api/stats/{symbol}.
async fn api_stats(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, HubError> {
    let symbol = symbol.to_ascii_uppercase();
    let statistics = state.store.stats(&symbol)?;
    Ok(Json(json!({
        "success": true,
        "statistics": statistics,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_parsing_accepts_numbers_and_rejects_junk() {
        let q = RangeQuery {
            start_time: Some("1748736000000".to_string()),
            end_time: None,
            limit: Some(" 500 ".to_string()),
        };
        let range = parse_range(&q).unwrap();
        assert_eq!(range.start, Some(1_748_736_000_000));
        assert_eq!(range.end, None);
        assert_eq!(range.limit, Some(500));

        let bad = RangeQuery {
            start_time: Some("tomorrow".to_string()),
            ..Default::default()
        };
        assert!(matches!(parse_range(&bad), Err(HubError::BadRequest(_))));
    }
}
