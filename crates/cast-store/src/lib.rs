//! SQLite storage substrate.
//!
//! One database file holds all symbols: a `klines_{symbol}` table for
//! real minute candles and a `prediccion_{symbol}` table for the
//! forecast series, both keyed by `open_time` (integer primary key =
//! the unique index). The ingestor writes candles, the predictor
//! writes predictions, the hub reads both; every write is idempotent
//! by primary key so concurrent re-runs are harmless.

mod error;

pub use error::StoreError;

use chrono::NaiveDate;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;

use cast_core::candle::{Candle, Prediction, SymbolStats};
use cast_core::time::{day_start_ms, hour_start_ms, HOUR_MS};

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

const KLINES_PREFIX: &str = "klines_";
const PREDICTIONS_PREFIX: &str = "prediccion_";

#[derive(Clone)]
pub struct MarketStore {
    pool: DbPool,
}

impl MarketStore {
    /// Open (creating if needed) the database file behind a pool.
    /// WAL journaling plus a busy timeout lets the hub and the
    /// predictor share the file from separate processes.
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = r2d2::Pool::builder().max_size(pool_size).build(manager)?;
        Ok(Self { pool })
    }

    /// Liveness probe used by `/health`.
    pub fn ping(&self) -> bool {
        self.pool
            .get()
            .ok()
            .and_then(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).ok())
            .is_some()
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Create both per-symbol tables if absent.
    pub fn ensure_symbol(&self, symbol: &str) -> Result<(), StoreError> {
        let suffix = collection_suffix(symbol)?;
        let conn = self.conn()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {KLINES_PREFIX}{suffix} (
                 open_time                    INTEGER PRIMARY KEY,
                 open                         REAL NOT NULL,
                 high                         REAL NOT NULL,
                 low                          REAL NOT NULL,
                 close                        REAL NOT NULL,
                 volume                       REAL NOT NULL,
                 close_time                   INTEGER NOT NULL,
                 quote_asset_volume           REAL NOT NULL,
                 number_of_trades             INTEGER NOT NULL,
                 taker_buy_base_asset_volume  REAL NOT NULL,
                 taker_buy_quote_asset_volume REAL NOT NULL
             );
             CREATE TABLE IF NOT EXISTS {PREDICTIONS_PREFIX}{suffix} (
                 open_time     INTEGER PRIMARY KEY,
                 open          REAL NOT NULL,
                 high          REAL NOT NULL,
                 low           REAL NOT NULL,
                 close         REAL NOT NULL,
                 volume        REAL NOT NULL,
                 close_time    INTEGER NOT NULL,
                 predicted_at  INTEGER NOT NULL,
                 model_version TEXT NOT NULL,
                 minutes_ahead INTEGER NOT NULL
             );"
        ))?;
        Ok(())
    }

    pub fn symbol_exists(&self, symbol: &str) -> Result<bool, StoreError> {
        let suffix = collection_suffix(symbol)?;
        let conn = self.conn()?;
        table_exists(&conn, &format!("{KLINES_PREFIX}{suffix}"))
    }

    /// All symbols with a candle collection, uppercased and sorted.
    pub fn known_symbols(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'klines_%'",
        )?;
        let mut symbols: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|name| name.ok())
            .filter_map(|name| {
                name.strip_prefix(KLINES_PREFIX)
                    .map(|s| s.to_ascii_uppercase())
            })
            .collect();
        symbols.sort();
        Ok(symbols)
    }

    fn require_symbol(&self, symbol: &str) -> Result<String, StoreError> {
        let suffix = collection_suffix(symbol)?;
        let conn = self.conn()?;
        if !table_exists(&conn, &format!("{KLINES_PREFIX}{suffix}"))? {
            return Err(StoreError::UnknownSymbol(symbol.to_ascii_uppercase()));
        }
        Ok(suffix)
    }

    /// Idempotent insert keyed by `open_time`; returns how many rows
    /// were actually new. History is never mutated or deleted.
    pub fn upsert_candles(&self, symbol: &str, candles: &[Candle]) -> Result<usize, StoreError> {
        self.ensure_symbol(symbol)?;
        let suffix = collection_suffix(symbol)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {KLINES_PREFIX}{suffix} (
                     open_time, open, high, low, close, volume, close_time,
                     quote_asset_volume, number_of_trades,
                     taker_buy_base_asset_volume, taker_buy_quote_asset_volume
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ))?;
            for c in candles {
                inserted += stmt.execute(params![
                    c.open_time,
                    c.open,
                    c.high,
                    c.low,
                    c.close,
                    c.volume,
                    c.close_time,
                    c.quote_asset_volume,
                    c.number_of_trades,
                    c.taker_buy_base_asset_volume,
                    c.taker_buy_quote_asset_volume,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn last_candle(&self, symbol: &str) -> Result<Option<Candle>, StoreError> {
        let suffix = self.require_symbol(symbol)?;
        let conn = self.conn()?;
        let candle = conn
            .query_row(
                &format!(
                    "SELECT {CANDLE_COLUMNS} FROM {KLINES_PREFIX}{suffix}
                     ORDER BY open_time DESC LIMIT 1"
                ),
                [],
                candle_from_row,
            )
            .optional()?;
        Ok(candle)
    }

    pub fn candle_at(&self, symbol: &str, open_time: i64) -> Result<Option<Candle>, StoreError> {
        let suffix = self.require_symbol(symbol)?;
        let conn = self.conn()?;
        let candle = conn
            .query_row(
                &format!(
                    "SELECT {CANDLE_COLUMNS} FROM {KLINES_PREFIX}{suffix} WHERE open_time = ?1"
                ),
                params![open_time],
                candle_from_row,
            )
            .optional()?;
        Ok(candle)
    }

    /// Candles ordered ascending by `open_time`, bounds inclusive.
    /// With only `limit` set, the NEWEST rows are returned (still in
    /// chronological order) so chart clients get the recent window.
    pub fn candles_range(
        &self,
        symbol: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>, StoreError> {
        let suffix = self.require_symbol(symbol)?;
        let table = format!("{KLINES_PREFIX}{suffix}");
        self.range_query(&table, CANDLE_COLUMNS, start_ms, end_ms, limit, candle_from_row)
    }

    /// Idempotent insert of an hour block (or any batch); duplicate
    /// `open_time`s are rejected by the key and counted as success.
    pub fn insert_predictions(
        &self,
        symbol: &str,
        predictions: &[Prediction],
    ) -> Result<usize, StoreError> {
        self.ensure_symbol(symbol)?;
        let suffix = collection_suffix(symbol)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {PREDICTIONS_PREFIX}{suffix} (
                     open_time, open, high, low, close, volume, close_time,
                     predicted_at, model_version, minutes_ahead
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ))?;
            for p in predictions {
                inserted += stmt.execute(params![
                    p.open_time,
                    p.open,
                    p.high,
                    p.low,
                    p.close,
                    p.volume,
                    p.close_time,
                    p.predicted_at,
                    p.model_version,
                    p.minutes_ahead,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn predictions_range(
        &self,
        symbol: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Prediction>, StoreError> {
        let suffix = self.require_symbol(symbol)?;
        let table = format!("{PREDICTIONS_PREFIX}{suffix}");
        let conn = self.conn()?;
        if !table_exists(&conn, &table)? {
            return Ok(Vec::new());
        }
        drop(conn);
        self.range_query(
            &table,
            PREDICTION_COLUMNS,
            start_ms,
            end_ms,
            limit,
            prediction_from_row,
        )
    }

    /// True iff at least one prediction's `open_time` falls inside
    /// `[date hour:00, date hour+1:00)` UTC.
    pub fn hour_has_prediction(
        &self,
        symbol: &str,
        date: NaiveDate,
        hour: u32,
    ) -> Result<bool, StoreError> {
        let suffix = collection_suffix(symbol)?;
        let table = format!("{PREDICTIONS_PREFIX}{suffix}");
        let conn = self.conn()?;
        if !table_exists(&conn, &table)? {
            return Ok(false);
        }
        let start = hour_start_ms(date, hour);
        let exists: i64 = conn.query_row(
            &format!(
                "SELECT EXISTS(
                     SELECT 1 FROM {table} WHERE open_time >= ?1 AND open_time < ?2
                 )"
            ),
            params![start, start + HOUR_MS],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    /// Max hour-of-day (0..=23) with at least one prediction whose
    /// `open_time` falls on the given UTC date.
    pub fn last_predicted_hour_today(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<u32>, StoreError> {
        let suffix = collection_suffix(symbol)?;
        let table = format!("{PREDICTIONS_PREFIX}{suffix}");
        let conn = self.conn()?;
        if !table_exists(&conn, &table)? {
            return Ok(None);
        }
        let day_start = day_start_ms(date);
        let day_end = day_start + 24 * HOUR_MS;
        let latest: Option<i64> = conn.query_row(
            &format!("SELECT MAX(open_time) FROM {table} WHERE open_time >= ?1 AND open_time < ?2"),
            params![day_start, day_end],
            |row| row.get(0),
        )?;
        Ok(latest.map(|ts| ((ts - day_start) / HOUR_MS) as u32))
    }

    /// True iff real candles exist for every minute of the hour.
    pub fn real_data_covers(
        &self,
        symbol: &str,
        date: NaiveDate,
        hour: u32,
    ) -> Result<bool, StoreError> {
        let suffix = collection_suffix(symbol)?;
        let table = format!("{KLINES_PREFIX}{suffix}");
        let conn = self.conn()?;
        if !table_exists(&conn, &table)? {
            return Ok(false);
        }
        let start = hour_start_ms(date, hour);
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE open_time >= ?1 AND open_time < ?2"),
            params![start, start + HOUR_MS],
            |row| row.get(0),
        )?;
        Ok(count == 60)
    }

    pub fn stats(&self, symbol: &str) -> Result<SymbolStats, StoreError> {
        let suffix = self.require_symbol(symbol)?;
        let conn = self.conn()?;
        let (total, first, last): (i64, Option<i64>, Option<i64>) = conn.query_row(
            &format!(
                "SELECT COUNT(*), MIN(open_time), MAX(open_time) FROM {KLINES_PREFIX}{suffix}"
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let last_price = match last {
            Some(ts) => conn
                .query_row(
                    &format!("SELECT close FROM {KLINES_PREFIX}{suffix} WHERE open_time = ?1"),
                    params![ts],
                    |row| row.get::<_, f64>(0),
                )
                .optional()?,
            None => None,
        };
        Ok(SymbolStats {
            symbol: symbol.to_ascii_uppercase(),
            total_records: total,
            first_record: first,
            last_record: last,
            last_price,
        })
    }

    /// Statistics for every known symbol, sorted by symbol.
    pub fn all_stats(&self) -> Result<Vec<SymbolStats>, StoreError> {
        let mut out = Vec::new();
        for symbol in self.known_symbols()? {
            out.push(self.stats(&symbol)?);
        }
        Ok(out)
    }

    fn range_query<T>(
        &self,
        table: &str,
        columns: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: Option<u32>,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StoreError> {
        let conn = self.conn()?;

        // Limit without bounds means "the newest rows": scan
        // descending then restore chronological order.
        if let (Some(limit), None, None) = (limit, start_ms, end_ms) {
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns} FROM {table} ORDER BY open_time DESC LIMIT ?1"
            ))?;
            let mut rows: Vec<T> = stmt
                .query_map(params![limit], map)?
                .collect::<Result<_, _>>()?;
            rows.reverse();
            return Ok(rows);
        }

        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(start) = start_ms {
            args.push(Box::new(start));
            clauses.push(format!("open_time >= ?{}", args.len()));
        }
        if let Some(end) = end_ms {
            args.push(Box::new(end));
            clauses.push(format!("open_time <= ?{}", args.len()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let limit_sql = match limit {
            Some(n) => format!(" LIMIT {n}"),
            None => String::new(),
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT {columns} FROM {table}{where_sql} ORDER BY open_time ASC{limit_sql}"
        ))?;
        let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows: Vec<T> = stmt
            .query_map(arg_refs.as_slice(), map)?
            .collect::<Result<_, _>>()?;
        Ok(rows)
    }
}

const CANDLE_COLUMNS: &str = "open_time, open, high, low, close, volume, close_time, \
     quote_asset_volume, number_of_trades, taker_buy_base_asset_volume, \
     taker_buy_quote_asset_volume";

const PREDICTION_COLUMNS: &str = "open_time, open, high, low, close, volume, close_time, \
     predicted_at, model_version, minutes_ahead";

fn candle_from_row(row: &Row<'_>) -> rusqlite::Result<Candle> {
    Ok(Candle {
        open_time: row.get(0)?,
        open: row.get(1)?,
        high: row.get(2)?,
        low: row.get(3)?,
        close: row.get(4)?,
        volume: row.get(5)?,
        close_time: row.get(6)?,
        quote_asset_volume: row.get(7)?,
        number_of_trades: row.get(8)?,
        taker_buy_base_asset_volume: row.get(9)?,
        taker_buy_quote_asset_volume: row.get(10)?,
    })
}

fn prediction_from_row(row: &Row<'_>) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        open_time: row.get(0)?,
        open: row.get(1)?,
        high: row.get(2)?,
        low: row.get(3)?,
        close: row.get(4)?,
        volume: row.get(5)?,
        close_time: row.get(6)?,
        predicted_at: row.get(7)?,
        model_version: row.get(8)?,
        minutes_ahead: row.get(9)?,
    })
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Lowercased table suffix; symbols must be plain ASCII alphanumerics
/// since they are spliced into table names.
fn collection_suffix(symbol: &str) -> Result<String, StoreError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StoreError::InvalidSymbol(symbol.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cast_core::time::MINUTE_MS;

    fn open_store() -> (tempfile::TempDir, MarketStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MarketStore::open(&dir.path().join("market.db"), 2).unwrap();
        (dir, store)
    }

    fn candle(minute: i64, close: f64) -> Candle {
        Candle {
            open_time: minute * MINUTE_MS,
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 5.0,
            close_time: minute * MINUTE_MS + 59_999,
            quote_asset_volume: 10.0,
            number_of_trades: 3,
            taker_buy_base_asset_volume: 2.0,
            taker_buy_quote_asset_volume: 4.0,
        }
    }

    fn prediction(minute: i64, close: f64) -> Prediction {
        Prediction {
            open_time: minute * MINUTE_MS,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 1.5,
            close,
            volume: 1.0,
            close_time: minute * MINUTE_MS + 59_999,
            predicted_at: 1_700_000_000_000,
            model_version: "20251117".to_string(),
            minutes_ahead: 1,
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let (_dir, store) = open_store();
        let batch: Vec<Candle> = (0..5).map(|i| candle(i, 100.0 + i as f64)).collect();

        assert_eq!(store.upsert_candles("BTCUSDT", &batch).unwrap(), 5);
        let stats_before = store.stats("BTCUSDT").unwrap();

        // Second run with the same data inserts nothing and changes nothing.
        assert_eq!(store.upsert_candles("BTCUSDT", &batch).unwrap(), 0);
        assert_eq!(store.stats("BTCUSDT").unwrap(), stats_before);

        assert_eq!(stats_before.total_records, 5);
        assert_eq!(stats_before.first_record, Some(0));
        assert_eq!(stats_before.last_record, Some(4 * MINUTE_MS));
        assert_eq!(stats_before.last_price, Some(104.0));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let (_dir, store) = open_store();
        let batch: Vec<Candle> = (0..10).map(|i| candle(i, 100.0)).collect();
        store.upsert_candles("ETHUSDT", &batch).unwrap();

        let rows = store
            .candles_range("ETHUSDT", Some(2 * MINUTE_MS), Some(5 * MINUTE_MS), None)
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.first().unwrap().open_time, 2 * MINUTE_MS);
        assert_eq!(rows.last().unwrap().open_time, 5 * MINUTE_MS);
    }

    #[test]
    fn bare_limit_returns_newest_in_order() {
        let (_dir, store) = open_store();
        let batch: Vec<Candle> = (0..10).map(|i| candle(i, 100.0)).collect();
        store.upsert_candles("ETHUSDT", &batch).unwrap();

        let rows = store.candles_range("ETHUSDT", None, None, Some(3)).unwrap();
        let times: Vec<i64> = rows.iter().map(|c| c.open_time).collect();
        assert_eq!(times, vec![7 * MINUTE_MS, 8 * MINUTE_MS, 9 * MINUTE_MS]);
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let (_dir, store) = open_store();
        match store.last_candle("NOPE") {
            Err(StoreError::UnknownSymbol(s)) => assert_eq!(s, "NOPE"),
            other => panic!("expected UnknownSymbol, got {other:?}"),
        }
        assert!(matches!(
            store.candles_range("not-a-symbol", None, None, None),
            Err(StoreError::InvalidSymbol(_))
        ));
    }

    #[test]
    fn known_symbols_ignores_prediction_tables() {
        let (_dir, store) = open_store();
        store.upsert_candles("BTCUSDT", &[candle(0, 1.0)]).unwrap();
        store.upsert_candles("ETHUSDT", &[candle(0, 1.0)]).unwrap();
        store
            .insert_predictions("BTCUSDT", &[prediction(10, 1.0)])
            .unwrap();
        assert_eq!(store.known_symbols().unwrap(), vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn duplicate_predictions_are_ignored() {
        let (_dir, store) = open_store();
        let block: Vec<Prediction> = (0..3).map(|i| prediction(i, 50.0)).collect();
        assert_eq!(store.insert_predictions("BTCUSDT", &block).unwrap(), 3);
        assert_eq!(store.insert_predictions("BTCUSDT", &block).unwrap(), 0);
        let rows = store
            .predictions_range("BTCUSDT", None, None, None)
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn hour_predicates() {
        let (_dir, store) = open_store();
        let date = NaiveDate::from_ymd_opt(2025, 11, 17).unwrap();
        let hour9 = hour_start_ms(date, 9) / MINUTE_MS;

        // Predictions in hour 9 of the date.
        let block: Vec<Prediction> = (0..3).map(|i| prediction(hour9 + i, 50.0)).collect();
        store.insert_predictions("BTCUSDT", &block).unwrap();

        assert!(store.hour_has_prediction("BTCUSDT", date, 9).unwrap());
        assert!(!store.hour_has_prediction("BTCUSDT", date, 10).unwrap());
        assert_eq!(
            store.last_predicted_hour_today("BTCUSDT", date).unwrap(),
            Some(9)
        );
        // A different date sees nothing.
        let other = NaiveDate::from_ymd_opt(2025, 11, 18).unwrap();
        assert_eq!(store.last_predicted_hour_today("BTCUSDT", other).unwrap(), None);
    }

    #[test]
    fn coverage_requires_all_sixty_minutes() {
        let (_dir, store) = open_store();
        let date = NaiveDate::from_ymd_opt(2025, 11, 17).unwrap();
        let hour14 = hour_start_ms(date, 14) / MINUTE_MS;

        let mut batch: Vec<Candle> = (0..60).map(|i| candle(hour14 + i, 100.0)).collect();
        // Withhold minute 30.
        batch.remove(30);
        store.upsert_candles("BTCUSDT", &batch).unwrap();
        assert!(!store.real_data_covers("BTCUSDT", date, 14).unwrap());

        store
            .upsert_candles("BTCUSDT", &[candle(hour14 + 30, 100.0)])
            .unwrap();
        assert!(store.real_data_covers("BTCUSDT", date, 14).unwrap());
    }

    #[test]
    fn candle_round_trips_all_fields() {
        let (_dir, store) = open_store();
        let c = candle(42, 123.45);
        store.upsert_candles("SOLUSDT", &[c.clone()]).unwrap();
        let back = store.last_candle("SOLUSDT").unwrap().unwrap();
        assert_eq!(back, c);
        assert_eq!(store.candle_at("SOLUSDT", c.open_time).unwrap(), Some(c));
    }
}
