//! Typed persistence facade over SQLite.
//!
//! A fixed pool of connections is opened at startup; each operation borrows
//! one, runs its statements (multi-statement writes inside a transaction)
//! and returns it. Uniqueness lives in the schema, so every upsert resolves
//! conflicts as updates rather than errors.

mod alerts;
mod catalog;
mod fundamentals;
mod market;
mod news;
mod schema;
mod settings;
mod state;
mod watchlist;

pub use state::CollectionDelta;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{info, warn};

pub use schema::SCHEMA_SQL;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),
    #[error("stored value corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row counts and file size returned by `/data/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub tables: BTreeMap<String, i64>,
    pub total_rows: i64,
    pub db_size_bytes: u64,
}

pub struct Store {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
    path: PathBuf,
}

impl Store {
    /// Open (creating if necessary) the database at `path` with a pool of
    /// `pool_size` connections, and apply the schema idempotently.
    pub fn open(path: impl AsRef<Path>, pool_size: usize) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // pool locking is ours

        let mut connections = Vec::with_capacity(pool_size.max(1));
        for i in 0..pool_size.max(1) {
            let conn = Connection::open_with_flags(&path, flags)?;
            if i == 0 {
                conn.execute_batch(SCHEMA_SQL)?;
                let journal_mode: String = conn
                    .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .unwrap_or_default();
                if !journal_mode.eq_ignore_ascii_case("wal") {
                    warn!("WAL mode not active, journal_mode = {}", journal_mode);
                }
            } else {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL; PRAGMA temp_store = MEMORY;",
                )?;
            }
            connections.push(Mutex::new(conn));
        }

        info!(path = %path.display(), pool = connections.len(), "store initialized");

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            path,
        })
    }

    /// In-memory store for tests: a single shared connection.
    #[doc(hidden)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            connections: vec![Mutex::new(conn)],
            next: AtomicUsize::new(0),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Borrow a pool connection round-robin and run `f` on it.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let mut conn = self.connections[idx].lock();
        Ok(f(&mut conn)?)
    }

    /// Liveness probe used by `/health`.
    pub fn ping(&self) -> StoreResult<()> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
    }

    /// Deletes market data (bars, flows, ticks, news, fundamentals,
    /// collection state) but preserves watchlist, catalog, alerts, settings.
    pub fn reset_market_data(&self) -> StoreResult<i64> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0i64;
            for table in schema::MARKET_DATA_TABLES {
                deleted += tx.execute(&format!("DELETE FROM {table}"), [])? as i64;
            }
            tx.commit()?;
            Ok(deleted)
        })
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let tables = self.with_conn(|conn| {
            let mut map = BTreeMap::new();
            for table in schema::ALL_TABLES {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
                map.insert(table.to_string(), count);
            }
            Ok(map)
        })?;
        let total_rows = tables.values().sum();
        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(StoreStats {
            tables,
            total_rows,
            db_size_bytes,
        })
    }
}

// ---- TEXT column codecs ------------------------------------------------

pub(crate) fn date_to_sql(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn opt_date_to_sql(d: Option<NaiveDate>) -> Option<String> {
    d.map(date_to_sql)
}

pub(crate) fn ts_to_sql(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

pub(crate) fn opt_ts_to_sql(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(ts_to_sql)
}

pub(crate) fn date_from_sql(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn opt_date_from_sql(s: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    s.as_deref().map(date_from_sql).transpose()
}

pub(crate) fn ts_from_sql(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn opt_ts_from_sql(s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.as_deref().map(ts_from_sql).transpose()
}

/// Decode a JSON string-array column, tolerating legacy empty values.
pub(crate) fn str_list_from_sql(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    pub(crate) fn test_store() -> Store {
        Store::open_in_memory().unwrap()
    }

    pub(crate) fn bar(ticker: &str, date: &str, close: f64) -> DailyBar {
        DailyBar {
            ticker: ticker.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close * 0.99,
            high: close * 1.01,
            low: close * 0.98,
            close,
            volume: 1_000,
            daily_change_pct: None,
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let store = test_store();
        store.with_conn(|c| c.execute_batch(SCHEMA_SQL)).unwrap();
        store.ping().unwrap();
    }

    #[test]
    fn file_backed_pool_shares_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etfwatch-test.db");
        let store = Store::open(&path, 4).unwrap();
        store.upsert_daily_bar(&bar("487240", "2026-07-01", 10000.0)).unwrap();
        // Round-robin reads hit every pool connection.
        for _ in 0..4 {
            assert_eq!(store.bars_all("487240").unwrap().len(), 1);
        }
        assert!(store.stats().unwrap().db_size_bytes > 0);
    }

    #[test]
    fn stats_counts_every_table() {
        let store = test_store();
        let stats = store.stats().unwrap();
        assert!(stats.tables.contains_key("daily_bars"));
        assert!(stats.tables.contains_key("catalog"));
        assert_eq!(stats.total_rows, 0);
    }

    #[test]
    fn reset_preserves_watchlist_catalog_alerts() {
        let store = test_store();
        store
            .add_ticker(&TickerInfo {
                ticker: "487240".into(),
                name: "KODEX AI전력핵심설비".into(),
                asset_type: AssetType::Etf,
                theme: "AI 전력".into(),
                launch_date: None,
                expense_ratio: None,
                purchase_date: None,
                purchase_price: None,
                quantity: None,
                search_keyword: None,
                relevance_keywords: vec![],
                display_order: 0,
            })
            .unwrap();
        store.upsert_daily_bar(&bar("487240", "2026-07-01", 10000.0)).unwrap();
        assert_eq!(store.bars_all("487240").unwrap().len(), 1);

        store.reset_market_data().unwrap();
        assert_eq!(store.bars_all("487240").unwrap().len(), 0);
        assert!(store.get_ticker("487240").unwrap().is_some());
    }
}
