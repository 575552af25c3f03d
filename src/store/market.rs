//! Daily bars, trading flows and intraday ticks.

use super::{date_from_sql, date_to_sql, ts_from_sql, ts_to_sql, Store, StoreResult};
use crate::models::{DailyBar, IntradayTick, TradingFlow};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

impl Store {
    /// Upsert one bar. `daily_change_pct` is recomputed from the most recent
    /// persisted close strictly earlier than the row's date; the caller's
    /// value is ignored.
    pub fn upsert_daily_bar(&self, bar: &DailyBar) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            Self::write_bar(&tx, bar)?;
            tx.commit()
        })
    }

    /// Upsert a batch inside one transaction, oldest first so in-batch
    /// predecessors are persisted before the change-pct lookup of the rows
    /// that follow them. Returns the number of rows written.
    pub fn upsert_daily_bars(&self, bars: &[DailyBar]) -> StoreResult<usize> {
        if bars.is_empty() {
            return Ok(0);
        }
        let mut sorted: Vec<&DailyBar> = bars.iter().collect();
        sorted.sort_by_key(|b| b.date);
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for bar in &sorted {
                Self::write_bar(&tx, bar)?;
            }
            tx.commit()?;
            Ok(sorted.len())
        })
    }

    fn write_bar(conn: &Connection, bar: &DailyBar) -> rusqlite::Result<()> {
        let prev_close: Option<f64> = conn
            .query_row(
                "SELECT close FROM daily_bars WHERE ticker = ?1 AND date < ?2 \
                 ORDER BY date DESC LIMIT 1",
                params![bar.ticker, date_to_sql(bar.date)],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let change_pct = prev_close
            .filter(|p| *p != 0.0)
            .map(|p| (bar.close - p) / p * 100.0);

        conn.prepare_cached(
            "INSERT INTO daily_bars (ticker, date, open, high, low, close, volume, daily_change_pct) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(ticker, date) DO UPDATE SET \
                open = excluded.open, high = excluded.high, low = excluded.low, \
                close = excluded.close, volume = excluded.volume, \
                daily_change_pct = excluded.daily_change_pct",
        )?
        .execute(params![
            bar.ticker,
            date_to_sql(bar.date),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
            change_pct,
        ])?;
        Ok(())
    }

    fn row_to_bar(row: &Row) -> rusqlite::Result<DailyBar> {
        Ok(DailyBar {
            ticker: row.get(0)?,
            date: date_from_sql(&row.get::<_, String>(1)?)?,
            open: row.get(2)?,
            high: row.get(3)?,
            low: row.get(4)?,
            close: row.get(5)?,
            volume: row.get(6)?,
            daily_change_pct: row.get(7)?,
        })
    }

    const BAR_COLS: &'static str =
        "ticker, date, open, high, low, close, volume, daily_change_pct";

    /// Bars in `[start, end]`, chronologically ascending.
    pub fn bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> StoreResult<Vec<DailyBar>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM daily_bars WHERE ticker = ?1 AND date >= ?2 AND date <= ?3 \
                 ORDER BY date ASC",
                Self::BAR_COLS
            ))?;
            let result = stmt
                .query_map(
                    params![ticker, date_to_sql(start), date_to_sql(end)],
                    Self::row_to_bar,
                )?
                .collect();
            result
        })
    }

    pub fn bars_all(&self, ticker: &str) -> StoreResult<Vec<DailyBar>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM daily_bars WHERE ticker = ?1 ORDER BY date ASC",
                Self::BAR_COLS
            ))?;
            let result = stmt.query_map(params![ticker], Self::row_to_bar)?.collect();
            result
        })
    }

    /// The most recent `limit` bars, still returned ascending.
    pub fn bars_recent(&self, ticker: &str, limit: usize) -> StoreResult<Vec<DailyBar>> {
        let mut bars = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM daily_bars WHERE ticker = ?1 ORDER BY date DESC LIMIT ?2",
                Self::BAR_COLS
            ))?;
            let result = stmt
                .query_map(params![ticker, limit as i64], Self::row_to_bar)?
                .collect::<rusqlite::Result<Vec<_>>>();
            result
        })?;
        bars.reverse();
        Ok(bars)
    }

    pub fn latest_bar(&self, ticker: &str) -> StoreResult<Option<DailyBar>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM daily_bars WHERE ticker = ?1 ORDER BY date DESC LIMIT 1",
                Self::BAR_COLS
            ))?;
            let mut rows = stmt.query_map(params![ticker], Self::row_to_bar)?;
            rows.next().transpose()
        })
    }

    pub fn upsert_trading_flow(&self, flow: &TradingFlow) -> StoreResult<()> {
        self.upsert_trading_flows(std::slice::from_ref(flow)).map(|_| ())
    }

    pub fn upsert_trading_flows(&self, flows: &[TradingFlow]) -> StoreResult<usize> {
        if flows.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for flow in flows {
                tx.prepare_cached(
                    "INSERT INTO trading_flows (ticker, date, individual_net, institutional_net, foreign_net) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(ticker, date) DO UPDATE SET \
                        individual_net = excluded.individual_net, \
                        institutional_net = excluded.institutional_net, \
                        foreign_net = excluded.foreign_net",
                )?
                .execute(params![
                    flow.ticker,
                    date_to_sql(flow.date),
                    flow.individual_net,
                    flow.institutional_net,
                    flow.foreign_net,
                ])?;
            }
            tx.commit()?;
            Ok(flows.len())
        })
    }

    fn row_to_flow(row: &Row) -> rusqlite::Result<TradingFlow> {
        Ok(TradingFlow {
            ticker: row.get(0)?,
            date: date_from_sql(&row.get::<_, String>(1)?)?,
            individual_net: row.get(2)?,
            institutional_net: row.get(3)?,
            foreign_net: row.get(4)?,
        })
    }

    pub fn trading_flows(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<TradingFlow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT ticker, date, individual_net, institutional_net, foreign_net \
                 FROM trading_flows WHERE ticker = ?1 AND date >= ?2 AND date <= ?3 \
                 ORDER BY date ASC",
            )?;
            let result = stmt
                .query_map(
                    params![ticker, date_to_sql(start), date_to_sql(end)],
                    Self::row_to_flow,
                )?
                .collect();
            result
        })
    }

    pub fn latest_trading_flow(&self, ticker: &str) -> StoreResult<Option<TradingFlow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT ticker, date, individual_net, institutional_net, foreign_net \
                 FROM trading_flows WHERE ticker = ?1 ORDER BY date DESC LIMIT 1",
            )?;
            let mut rows = stmt.query_map(params![ticker], Self::row_to_flow)?;
            rows.next().transpose()
        })
    }

    pub fn upsert_intraday_ticks(&self, ticks: &[IntradayTick]) -> StoreResult<usize> {
        if ticks.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for tick in ticks {
                tx.prepare_cached(
                    "INSERT INTO intraday_ticks \
                        (ticker, datetime, price, change_amount, volume, bid_volume, ask_volume) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                     ON CONFLICT(ticker, datetime) DO UPDATE SET \
                        price = excluded.price, change_amount = excluded.change_amount, \
                        volume = excluded.volume, bid_volume = excluded.bid_volume, \
                        ask_volume = excluded.ask_volume",
                )?
                .execute(params![
                    tick.ticker,
                    ts_to_sql(tick.datetime),
                    tick.price,
                    tick.change_amount,
                    tick.volume,
                    tick.bid_volume,
                    tick.ask_volume,
                ])?;
            }
            tx.commit()?;
            Ok(ticks.len())
        })
    }

    /// Ticks whose timestamp falls on `date` (UTC day), ascending.
    pub fn intraday_ticks(&self, ticker: &str, date: NaiveDate) -> StoreResult<Vec<IntradayTick>> {
        let day_start = format!("{}T00:00:00", date_to_sql(date));
        let day_end = format!("{}T23:59:59.999999999", date_to_sql(date));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT ticker, datetime, price, change_amount, volume, bid_volume, ask_volume \
                 FROM intraday_ticks WHERE ticker = ?1 AND datetime >= ?2 AND datetime <= ?3 \
                 ORDER BY datetime ASC",
            )?;
            let result = stmt
                .query_map(params![ticker, day_start, day_end], |row| {
                    Ok(IntradayTick {
                        ticker: row.get(0)?,
                        datetime: ts_from_sql(&row.get::<_, String>(1)?)?,
                        price: row.get(2)?,
                        change_amount: row.get(3)?,
                        volume: row.get(4)?,
                        bid_volume: row.get(5)?,
                        ask_volume: row.get(6)?,
                    })
                })?
                .collect();
            result
        })
    }
}
