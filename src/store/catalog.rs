//! Discoverable ticker catalog with screener snapshot columns.

use super::{
    opt_date_from_sql, opt_date_to_sql, opt_ts_from_sql, opt_ts_to_sql, Store, StoreResult,
};
use crate::models::{AssetType, CatalogEntry};
use rusqlite::{params, Row};

impl Store {
    fn row_to_catalog(row: &Row) -> rusqlite::Result<CatalogEntry> {
        let asset_type: String = row.get(2)?;
        Ok(CatalogEntry {
            ticker: row.get(0)?,
            name: row.get(1)?,
            asset_type: AssetType::parse(&asset_type).unwrap_or(AssetType::Stock),
            market: row.get(3)?,
            sector: row.get(4)?,
            listed_date: opt_date_from_sql(row.get(5)?)?,
            last_updated: opt_ts_from_sql(row.get(6)?)?,
            is_active: row.get::<_, i64>(7)? != 0,
            close_price: row.get(8)?,
            daily_change_pct: row.get(9)?,
            volume: row.get(10)?,
            weekly_return: row.get(11)?,
            foreign_net: row.get(12)?,
            institutional_net: row.get(13)?,
            catalog_updated_at: opt_ts_from_sql(row.get(14)?)?,
        })
    }

    const CATALOG_COLS: &'static str = "ticker, name, asset_type, market, sector, listed_date, \
        last_updated, is_active, close_price, daily_change_pct, volume, weekly_return, \
        foreign_net, institutional_net, catalog_updated_at";

    /// Upsert catalog identity rows (from the universe crawl). Snapshot
    /// columns are preserved when the entry already exists.
    pub fn upsert_catalog_entries(&self, entries: &[CatalogEntry]) -> StoreResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for e in entries {
                tx.prepare_cached(
                    "INSERT INTO catalog (ticker, name, asset_type, market, sector, listed_date, \
                        last_updated, is_active) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                     ON CONFLICT(ticker) DO UPDATE SET \
                        name = excluded.name, asset_type = excluded.asset_type, \
                        market = excluded.market, sector = excluded.sector, \
                        listed_date = COALESCE(excluded.listed_date, catalog.listed_date), \
                        last_updated = excluded.last_updated, is_active = excluded.is_active",
                )?
                .execute(params![
                    e.ticker,
                    e.name,
                    e.asset_type.as_str(),
                    e.market,
                    e.sector,
                    opt_date_to_sql(e.listed_date),
                    opt_ts_to_sql(e.last_updated),
                    e.is_active as i64,
                ])?;
            }
            tx.commit()?;
            Ok(entries.len())
        })
    }

    /// Write the screener snapshot columns for one catalog entry.
    pub fn update_catalog_snapshot(&self, e: &CatalogEntry) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "UPDATE catalog SET close_price = ?2, daily_change_pct = ?3, volume = ?4, \
                    weekly_return = ?5, foreign_net = ?6, institutional_net = ?7, \
                    catalog_updated_at = ?8 \
                 WHERE ticker = ?1",
            )?
            .execute(params![
                e.ticker,
                e.close_price,
                e.daily_change_pct,
                e.volume,
                e.weekly_return,
                e.foreign_net,
                e.institutional_net,
                opt_ts_to_sql(e.catalog_updated_at),
            ])?;
            Ok(())
        })
    }

    pub fn catalog_entry(&self, ticker: &str) -> StoreResult<Option<CatalogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM catalog WHERE ticker = ?1",
                Self::CATALOG_COLS
            ))?;
            let mut rows = stmt.query_map(params![ticker], Self::row_to_catalog)?;
            rows.next().transpose()
        })
    }

    /// All active catalog entries. The screener filters and sorts in memory.
    pub fn catalog_entries(&self) -> StoreResult<Vec<CatalogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM catalog WHERE is_active = 1 ORDER BY ticker",
                Self::CATALOG_COLS
            ))?;
            let result = stmt.query_map([], Self::row_to_catalog)?.collect();
            result
        })
    }

    /// Name/ticker prefix+substring autocomplete over the catalog.
    pub fn search_catalog(
        &self,
        query: &str,
        asset_type: Option<AssetType>,
        limit: usize,
    ) -> StoreResult<Vec<CatalogEntry>> {
        let pattern = format!("%{}%", query.replace('%', "").replace('_', ""));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM catalog \
                 WHERE is_active = 1 AND (ticker LIKE ?1 OR name LIKE ?1) \
                   AND (?2 IS NULL OR asset_type = ?2) \
                 ORDER BY CASE WHEN ticker = ?3 THEN 0 WHEN name LIKE ?4 THEN 1 ELSE 2 END, ticker \
                 LIMIT ?5",
                Self::CATALOG_COLS
            ))?;
            let result = stmt
                .query_map(
                    params![
                        pattern,
                        asset_type.map(|t| t.as_str()),
                        query,
                        format!("{}%", query),
                        limit as i64
                    ],
                    Self::row_to_catalog,
                )?
                .collect();
            result
        })
    }

    pub fn catalog_count(&self) -> StoreResult<i64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM catalog WHERE is_active = 1", [], |row| {
                row.get(0)
            })
        })
    }
}
