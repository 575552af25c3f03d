//! Stock/ETF fundamentals and ETF constituent holdings.

use super::{date_from_sql, date_to_sql, Store, StoreResult};
use crate::models::{EtfFundamentals, EtfHolding, StockFundamentals};
use rusqlite::params;

impl Store {
    pub fn upsert_stock_fundamentals(&self, f: &StockFundamentals) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO stock_fundamentals (ticker, date, per, pbr, roe, eps, bps) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(ticker, date) DO UPDATE SET \
                    per = excluded.per, pbr = excluded.pbr, roe = excluded.roe, \
                    eps = excluded.eps, bps = excluded.bps",
            )?
            .execute(params![
                f.ticker,
                date_to_sql(f.date),
                f.per,
                f.pbr,
                f.roe,
                f.eps,
                f.bps,
            ])?;
            Ok(())
        })
    }

    pub fn latest_stock_fundamentals(&self, ticker: &str) -> StoreResult<Option<StockFundamentals>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT ticker, date, per, pbr, roe, eps, bps FROM stock_fundamentals \
                 WHERE ticker = ?1 ORDER BY date DESC LIMIT 1",
            )?;
            let mut rows = stmt.query_map(params![ticker], |row| {
                Ok(StockFundamentals {
                    ticker: row.get(0)?,
                    date: date_from_sql(&row.get::<_, String>(1)?)?,
                    per: row.get(2)?,
                    pbr: row.get(3)?,
                    roe: row.get(4)?,
                    eps: row.get(5)?,
                    bps: row.get(6)?,
                })
            })?;
            rows.next().transpose()
        })
    }

    pub fn upsert_etf_fundamentals(&self, f: &EtfFundamentals) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO etf_fundamentals (ticker, date, nav, expense_ratio) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(ticker, date) DO UPDATE SET \
                    nav = excluded.nav, expense_ratio = excluded.expense_ratio",
            )?
            .execute(params![f.ticker, date_to_sql(f.date), f.nav, f.expense_ratio])?;
            Ok(())
        })
    }

    pub fn latest_etf_fundamentals(&self, ticker: &str) -> StoreResult<Option<EtfFundamentals>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT ticker, date, nav, expense_ratio FROM etf_fundamentals \
                 WHERE ticker = ?1 ORDER BY date DESC LIMIT 1",
            )?;
            let mut rows = stmt.query_map(params![ticker], |row| {
                Ok(EtfFundamentals {
                    ticker: row.get(0)?,
                    date: date_from_sql(&row.get::<_, String>(1)?)?,
                    nav: row.get(2)?,
                    expense_ratio: row.get(3)?,
                })
            })?;
            rows.next().transpose()
        })
    }

    pub fn upsert_etf_holdings(&self, holdings: &[EtfHolding]) -> StoreResult<usize> {
        if holdings.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for h in holdings {
                tx.prepare_cached(
                    "INSERT INTO etf_holdings (ticker, date, constituent_ticker, name, weight) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(ticker, date, constituent_ticker) DO UPDATE SET \
                        name = excluded.name, weight = excluded.weight",
                )?
                .execute(params![
                    h.ticker,
                    date_to_sql(h.date),
                    h.constituent_ticker,
                    h.name,
                    h.weight,
                ])?;
            }
            tx.commit()?;
            Ok(holdings.len())
        })
    }

    /// Holdings for the most recent snapshot date.
    pub fn latest_etf_holdings(&self, ticker: &str) -> StoreResult<Vec<EtfHolding>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT ticker, date, constituent_ticker, name, weight FROM etf_holdings \
                 WHERE ticker = ?1 AND date = \
                    (SELECT MAX(date) FROM etf_holdings WHERE ticker = ?1) \
                 ORDER BY weight DESC",
            )?;
            let result = stmt
                .query_map(params![ticker], |row| {
                    Ok(EtfHolding {
                        ticker: row.get(0)?,
                        date: date_from_sql(&row.get::<_, String>(1)?)?,
                        constituent_ticker: row.get(2)?,
                        name: row.get(3)?,
                        weight: row.get(4)?,
                    })
                })?
                .collect();
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_store;
    use chrono::NaiveDate;

    #[test]
    fn latest_fundamentals_picks_newest_date() {
        let store = test_store();
        for (day, per) in [(1, 10.0), (2, 11.5)] {
            store
                .upsert_stock_fundamentals(&StockFundamentals {
                    ticker: "005930".into(),
                    date: NaiveDate::from_ymd_opt(2026, 7, day).unwrap(),
                    per: Some(per),
                    pbr: Some(1.2),
                    roe: Some(9.0),
                    eps: Some(5000.0),
                    bps: Some(52000.0),
                })
                .unwrap();
        }
        let latest = store.latest_stock_fundamentals("005930").unwrap().unwrap();
        assert_eq!(latest.per, Some(11.5));
    }

    #[test]
    fn holdings_snapshot_is_per_date() {
        let store = test_store();
        let h = |day: u32, ct: &str, w: f64| EtfHolding {
            ticker: "487240".into(),
            date: NaiveDate::from_ymd_opt(2026, 7, day).unwrap(),
            constituent_ticker: ct.into(),
            name: ct.into(),
            weight: w,
        };
        store
            .upsert_etf_holdings(&[h(1, "005930", 20.0), h(2, "005930", 21.0), h(2, "000660", 15.0)])
            .unwrap();
        let latest = store.latest_etf_holdings("487240").unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].weight, 21.0);
    }
}
