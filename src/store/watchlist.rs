//! Registered watchlist CRUD and the ticker-delete cascade.

use super::{opt_date_from_sql, opt_date_to_sql, str_list_from_sql, Store, StoreResult};
use crate::models::{AssetType, TickerInfo};
use rusqlite::{params, Row};

impl Store {
    fn row_to_ticker(row: &Row) -> rusqlite::Result<TickerInfo> {
        let asset_type: String = row.get(2)?;
        Ok(TickerInfo {
            ticker: row.get(0)?,
            name: row.get(1)?,
            asset_type: AssetType::parse(&asset_type).unwrap_or(AssetType::Etf),
            theme: row.get(3)?,
            launch_date: opt_date_from_sql(row.get(4)?)?,
            expense_ratio: row.get(5)?,
            purchase_date: opt_date_from_sql(row.get(6)?)?,
            purchase_price: row.get(7)?,
            quantity: row.get(8)?,
            search_keyword: row.get(9)?,
            relevance_keywords: str_list_from_sql(&row.get::<_, String>(10)?),
            display_order: row.get(11)?,
        })
    }

    const TICKER_COLS: &'static str = "ticker, name, asset_type, theme, launch_date, \
        expense_ratio, purchase_date, purchase_price, quantity, search_keyword, \
        relevance_keywords, display_order";

    /// Insert a watchlist entry. Returns false when the ticker is already
    /// registered.
    pub fn add_ticker(&self, info: &TickerInfo) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let next_order: i64 = conn.query_row(
                "SELECT COALESCE(MAX(display_order), -1) + 1 FROM tickers",
                [],
                |row| row.get(0),
            )?;
            let order = if info.display_order > 0 {
                info.display_order
            } else {
                next_order
            };
            let inserted = conn.prepare_cached(
                "INSERT OR IGNORE INTO tickers (ticker, name, asset_type, theme, launch_date, \
                    expense_ratio, purchase_date, purchase_price, quantity, search_keyword, \
                    relevance_keywords, display_order) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?
            .execute(params![
                info.ticker,
                info.name,
                info.asset_type.as_str(),
                info.theme,
                opt_date_to_sql(info.launch_date),
                info.expense_ratio,
                opt_date_to_sql(info.purchase_date),
                info.purchase_price,
                info.quantity,
                info.search_keyword,
                serde_json::to_string(&info.relevance_keywords).unwrap_or_else(|_| "[]".into()),
                order,
            ])?;
            Ok(inserted > 0)
        })
    }

    /// Full-row update. Returns false when the ticker is unknown.
    pub fn update_ticker(&self, info: &TickerInfo) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.prepare_cached(
                "UPDATE tickers SET name = ?2, asset_type = ?3, theme = ?4, launch_date = ?5, \
                    expense_ratio = ?6, purchase_date = ?7, purchase_price = ?8, quantity = ?9, \
                    search_keyword = ?10, relevance_keywords = ?11 \
                 WHERE ticker = ?1",
            )?
            .execute(params![
                info.ticker,
                info.name,
                info.asset_type.as_str(),
                info.theme,
                opt_date_to_sql(info.launch_date),
                info.expense_ratio,
                opt_date_to_sql(info.purchase_date),
                info.purchase_price,
                info.quantity,
                info.search_keyword,
                serde_json::to_string(&info.relevance_keywords).unwrap_or_else(|_| "[]".into()),
            ])?;
            Ok(changed > 0)
        })
    }

    pub fn get_ticker(&self, ticker: &str) -> StoreResult<Option<TickerInfo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM tickers WHERE ticker = ?1",
                Self::TICKER_COLS
            ))?;
            let mut rows = stmt.query_map(params![ticker], Self::row_to_ticker)?;
            rows.next().transpose()
        })
    }

    /// Watchlist in display order.
    pub fn list_tickers(&self) -> StoreResult<Vec<TickerInfo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM tickers ORDER BY display_order ASC, ticker ASC",
                Self::TICKER_COLS
            ))?;
            let result = stmt.query_map([], Self::row_to_ticker)?.collect();
            result
        })
    }

    /// Remove a ticker and cascade to its market data, news, fundamentals,
    /// holdings, collection state and alert rules. Catalog rows and alert
    /// history are preserved. Returns false when the ticker is unknown.
    pub fn delete_ticker(&self, ticker: &str) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM tickers WHERE ticker = ?1", params![ticker])?;
            if removed > 0 {
                for table in [
                    "daily_bars",
                    "trading_flows",
                    "intraday_ticks",
                    "news",
                    "stock_fundamentals",
                    "etf_fundamentals",
                    "etf_holdings",
                    "collection_state",
                    "alert_rules",
                ] {
                    tx.execute(&format!("DELETE FROM {table} WHERE ticker = ?1"), params![ticker])?;
                }
            }
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    /// Persist a new display ordering. Tickers missing from `order` keep
    /// their position after the listed ones.
    pub fn reorder_tickers(&self, order: &[String]) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for (idx, ticker) in order.iter().enumerate() {
                tx.prepare_cached("UPDATE tickers SET display_order = ?2 WHERE ticker = ?1")?
                    .execute(params![ticker, idx as i64])?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}
