//! Collection-state bookkeeping.
//!
//! Updates are single UPSERT statements so concurrent collectors merging
//! deltas for the same ticker stay linearizable without read-modify-write.
//! Date watermarks only ever advance, which makes `last_price_date` equal
//! the max date of a batch regardless of input ordering.

use super::{
    date_to_sql, opt_date_from_sql, opt_date_to_sql, opt_ts_from_sql, opt_ts_to_sql, Store,
    StoreResult,
};
use crate::models::CollectionState;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Row};

/// Field-merge applied to a ticker's collection state. Unset fields keep
/// their stored value; counters are additive.
#[derive(Debug, Clone, Default)]
pub struct CollectionDelta {
    pub last_price_date: Option<NaiveDate>,
    pub last_trading_flow_date: Option<NaiveDate>,
    pub last_news_collected_at: Option<DateTime<Utc>>,
    pub price_records_added: i64,
    pub trading_flow_records_added: i64,
    pub news_records_added: i64,
    pub attempt_at: Option<DateTime<Utc>>,
    pub success_at: Option<DateTime<Utc>>,
    /// `Some(true)` increments `consecutive_failures`, `Some(false)` resets
    /// it to zero, `None` leaves it alone.
    pub failure: Option<bool>,
}

impl CollectionDelta {
    pub fn attempt(now: DateTime<Utc>) -> Self {
        Self {
            attempt_at: Some(now),
            ..Default::default()
        }
    }

    pub fn success(now: DateTime<Utc>) -> Self {
        Self {
            attempt_at: Some(now),
            success_at: Some(now),
            failure: Some(false),
            ..Default::default()
        }
    }

    pub fn failed(now: DateTime<Utc>) -> Self {
        Self {
            attempt_at: Some(now),
            failure: Some(true),
            ..Default::default()
        }
    }
}

impl Store {
    pub fn update_collection_state(&self, ticker: &str, delta: &CollectionDelta) -> StoreResult<()> {
        // failure encoding: 1 increment, -1 reset, 0 keep
        let failure_op: i64 = match delta.failure {
            Some(true) => 1,
            Some(false) => -1,
            None => 0,
        };
        self.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO collection_state (ticker, last_price_date, last_trading_flow_date, \
                    last_news_collected_at, price_records_count, trading_flow_records_count, \
                    news_records_count, last_collection_attempt, last_successful_collection, \
                    consecutive_failures) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, MAX(?10, 0)) \
                 ON CONFLICT(ticker) DO UPDATE SET \
                    last_price_date = CASE \
                        WHEN excluded.last_price_date IS NOT NULL \
                             AND (collection_state.last_price_date IS NULL \
                                  OR excluded.last_price_date > collection_state.last_price_date) \
                        THEN excluded.last_price_date ELSE collection_state.last_price_date END, \
                    last_trading_flow_date = CASE \
                        WHEN excluded.last_trading_flow_date IS NOT NULL \
                             AND (collection_state.last_trading_flow_date IS NULL \
                                  OR excluded.last_trading_flow_date > collection_state.last_trading_flow_date) \
                        THEN excluded.last_trading_flow_date ELSE collection_state.last_trading_flow_date END, \
                    last_news_collected_at = COALESCE(excluded.last_news_collected_at, \
                        collection_state.last_news_collected_at), \
                    price_records_count = collection_state.price_records_count + ?5, \
                    trading_flow_records_count = collection_state.trading_flow_records_count + ?6, \
                    news_records_count = collection_state.news_records_count + ?7, \
                    last_collection_attempt = COALESCE(excluded.last_collection_attempt, \
                        collection_state.last_collection_attempt), \
                    last_successful_collection = COALESCE(excluded.last_successful_collection, \
                        collection_state.last_successful_collection), \
                    consecutive_failures = CASE ?10 \
                        WHEN 1 THEN collection_state.consecutive_failures + 1 \
                        WHEN -1 THEN 0 \
                        ELSE collection_state.consecutive_failures END",
            )?
            .execute(params![
                ticker,
                opt_date_to_sql(delta.last_price_date),
                opt_date_to_sql(delta.last_trading_flow_date),
                opt_ts_to_sql(delta.last_news_collected_at),
                delta.price_records_added,
                delta.trading_flow_records_added,
                delta.news_records_added,
                opt_ts_to_sql(delta.attempt_at),
                opt_ts_to_sql(delta.success_at),
                failure_op,
            ])?;
            Ok(())
        })
    }

    fn row_to_state(row: &Row) -> rusqlite::Result<CollectionState> {
        Ok(CollectionState {
            ticker: row.get(0)?,
            last_price_date: opt_date_from_sql(row.get(1)?)?,
            last_trading_flow_date: opt_date_from_sql(row.get(2)?)?,
            last_news_collected_at: opt_ts_from_sql(row.get(3)?)?,
            price_records_count: row.get(4)?,
            trading_flow_records_count: row.get(5)?,
            news_records_count: row.get(6)?,
            last_collection_attempt: opt_ts_from_sql(row.get(7)?)?,
            last_successful_collection: opt_ts_from_sql(row.get(8)?)?,
            consecutive_failures: row.get(9)?,
        })
    }

    const STATE_COLS: &'static str = "ticker, last_price_date, last_trading_flow_date, \
        last_news_collected_at, price_records_count, trading_flow_records_count, \
        news_records_count, last_collection_attempt, last_successful_collection, \
        consecutive_failures";

    pub fn collection_state(&self, ticker: &str) -> StoreResult<Option<CollectionState>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM collection_state WHERE ticker = ?1",
                Self::STATE_COLS
            ))?;
            let mut rows = stmt.query_map(params![ticker], Self::row_to_state)?;
            rows.next().transpose()
        })
    }

    pub fn all_collection_states(&self) -> StoreResult<Vec<CollectionState>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM collection_state ORDER BY ticker",
                Self::STATE_COLS
            ))?;
            let result = stmt.query_map([], Self::row_to_state)?.collect();
            result
        })
    }

    /// Covered dates inside `[start, end]`, used for gap detection.
    pub fn bar_dates(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> StoreResult<Vec<NaiveDate>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT date FROM daily_bars WHERE ticker = ?1 AND date >= ?2 AND date <= ?3 \
                 ORDER BY date ASC",
            )?;
            let result = stmt
                .query_map(params![ticker, date_to_sql(start), date_to_sql(end)], |row| {
                    super::date_from_sql(&row.get::<_, String>(0)?)
                })?
                .collect();
            result
        })
    }
}
