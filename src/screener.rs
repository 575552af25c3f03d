//! Screener over catalog snapshot columns: filtering, sorting, paging,
//! sector grouping and named recommendation presets.

use crate::models::{AssetType, CatalogEntry};
use serde::Serialize;
use std::collections::BTreeMap;

pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    WeeklyReturn,
    DailyChangePct,
    Volume,
    ClosePrice,
    ForeignNet,
    InstitutionalNet,
    Name,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weekly_return" => Some(SortKey::WeeklyReturn),
            "daily_change_pct" => Some(SortKey::DailyChangePct),
            "volume" => Some(SortKey::Volume),
            "close_price" => Some(SortKey::ClosePrice),
            "foreign_net" => Some(SortKey::ForeignNet),
            "institutional_net" => Some(SortKey::InstitutionalNet),
            "name" => Some(SortKey::Name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortDir::Asc),
            "desc" => Some(SortDir::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScreenerQuery {
    /// Substring match against name or ticker.
    pub query: Option<String>,
    pub asset_type: Option<AssetType>,
    pub sector: Option<String>,
    pub min_weekly_return: Option<f64>,
    pub max_weekly_return: Option<f64>,
    pub foreign_net_positive: bool,
    pub institutional_net_positive: bool,
    pub sort_by: Option<SortKey>,
    pub sort_dir: Option<SortDir>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenerPage {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub items: Vec<CatalogEntry>,
}

fn matches(entry: &CatalogEntry, q: &ScreenerQuery) -> bool {
    if let Some(text) = &q.query {
        let text = text.trim();
        if !text.is_empty() && !entry.name.contains(text) && !entry.ticker.contains(text) {
            return false;
        }
    }
    if let Some(t) = q.asset_type {
        if entry.asset_type != t {
            return false;
        }
    }
    if let Some(sector) = &q.sector {
        if !sector.is_empty() && &entry.sector != sector {
            return false;
        }
    }
    if let Some(min) = q.min_weekly_return {
        if entry.weekly_return.map(|r| r < min).unwrap_or(true) {
            return false;
        }
    }
    if let Some(max) = q.max_weekly_return {
        if entry.weekly_return.map(|r| r > max).unwrap_or(true) {
            return false;
        }
    }
    if q.foreign_net_positive && entry.foreign_net.map(|n| n <= 0).unwrap_or(true) {
        return false;
    }
    if q.institutional_net_positive && entry.institutional_net.map(|n| n <= 0).unwrap_or(true) {
        return false;
    }
    true
}

fn sort_entries(entries: &mut [CatalogEntry], key: SortKey, dir: SortDir) {
    let by_f64 = |v: Option<f64>| v.unwrap_or(f64::NEG_INFINITY);
    let by_i64 = |v: Option<i64>| v.unwrap_or(i64::MIN);
    entries.sort_by(|a, b| {
        let ord = match key {
            SortKey::WeeklyReturn => by_f64(a.weekly_return).total_cmp(&by_f64(b.weekly_return)),
            SortKey::DailyChangePct => {
                by_f64(a.daily_change_pct).total_cmp(&by_f64(b.daily_change_pct))
            }
            SortKey::Volume => by_i64(a.volume).cmp(&by_i64(b.volume)),
            SortKey::ClosePrice => by_f64(a.close_price).total_cmp(&by_f64(b.close_price)),
            SortKey::ForeignNet => by_i64(a.foreign_net).cmp(&by_i64(b.foreign_net)),
            SortKey::InstitutionalNet => {
                by_i64(a.institutional_net).cmp(&by_i64(b.institutional_net))
            }
            SortKey::Name => a.name.cmp(&b.name),
        };
        match dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    });
}

/// Filter, sort and page the catalog in memory. Paging is clamped rather
/// than rejected; input validation happens at the API boundary.
pub fn screen(entries: Vec<CatalogEntry>, query: &ScreenerQuery) -> ScreenerPage {
    let mut filtered: Vec<CatalogEntry> = entries
        .into_iter()
        .filter(|e| matches(e, query))
        .collect();

    let key = query.sort_by.unwrap_or(SortKey::WeeklyReturn);
    let dir = query.sort_dir.unwrap_or(SortDir::Desc);
    sort_entries(&mut filtered, key, dir);

    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);
    let total = filtered.len();
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = (start + page_size).min(total);

    ScreenerPage {
        total,
        page,
        page_size,
        items: filtered[start..end].to_vec(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThemeSummary {
    pub sector: String,
    pub count: usize,
    pub avg_weekly_return: Option<f64>,
    pub top: Vec<CatalogEntry>,
}

/// Sector grouping with count, average weekly return and the top three
/// entries per sector.
pub fn themes(entries: Vec<CatalogEntry>) -> Vec<ThemeSummary> {
    let mut groups: BTreeMap<String, Vec<CatalogEntry>> = BTreeMap::new();
    for entry in entries {
        let sector = if entry.sector.is_empty() {
            "기타".to_string()
        } else {
            entry.sector.clone()
        };
        groups.entry(sector).or_default().push(entry);
    }

    let mut summaries: Vec<ThemeSummary> = groups
        .into_iter()
        .map(|(sector, mut members)| {
            let returns: Vec<f64> = members.iter().filter_map(|e| e.weekly_return).collect();
            let avg = if returns.is_empty() {
                None
            } else {
                Some(returns.iter().sum::<f64>() / returns.len() as f64)
            };
            sort_entries(&mut members, SortKey::WeeklyReturn, SortDir::Desc);
            let count = members.len();
            members.truncate(3);
            ThemeSummary {
                sector,
                count,
                avg_weekly_return: avg,
                top: members,
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.avg_weekly_return
            .unwrap_or(f64::NEG_INFINITY)
            .total_cmp(&a.avg_weekly_return.unwrap_or(f64::NEG_INFINITY))
    });
    summaries
}

pub const RECOMMENDATION_PRESETS: &[&str] = &[
    "weekly-top",
    "foreign-buy-surge",
    "institutional-buy-surge",
    "volume-top",
    "weekly-drop",
];

/// Named preset queries for the recommendations endpoint.
pub fn recommendations(entries: &[CatalogEntry], limit: usize) -> BTreeMap<String, Vec<CatalogEntry>> {
    let run = |key: SortKey, dir: SortDir, filter: fn(&CatalogEntry) -> bool| {
        let mut subset: Vec<CatalogEntry> = entries.iter().filter(|e| filter(e)).cloned().collect();
        sort_entries(&mut subset, key, dir);
        subset.truncate(limit);
        subset
    };

    let mut out = BTreeMap::new();
    out.insert(
        "weekly-top".to_string(),
        run(SortKey::WeeklyReturn, SortDir::Desc, |e| {
            e.weekly_return.is_some()
        }),
    );
    out.insert(
        "foreign-buy-surge".to_string(),
        run(SortKey::ForeignNet, SortDir::Desc, |e| {
            e.foreign_net.map(|n| n > 0).unwrap_or(false)
        }),
    );
    out.insert(
        "institutional-buy-surge".to_string(),
        run(SortKey::InstitutionalNet, SortDir::Desc, |e| {
            e.institutional_net.map(|n| n > 0).unwrap_or(false)
        }),
    );
    out.insert(
        "volume-top".to_string(),
        run(SortKey::Volume, SortDir::Desc, |e| e.volume.is_some()),
    );
    out.insert(
        "weekly-drop".to_string(),
        run(SortKey::WeeklyReturn, SortDir::Asc, |e| {
            e.weekly_return.is_some()
        }),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ticker: &str, name: &str, sector: &str, weekly: Option<f64>, foreign: Option<i64>) -> CatalogEntry {
        CatalogEntry {
            ticker: ticker.into(),
            name: name.into(),
            asset_type: AssetType::Stock,
            market: "KOSPI".into(),
            sector: sector.into(),
            listed_date: None,
            last_updated: None,
            is_active: true,
            close_price: Some(1000.0),
            daily_change_pct: Some(0.5),
            volume: Some(10_000),
            weekly_return: weekly,
            foreign_net: foreign,
            institutional_net: Some(100),
            catalog_updated_at: None,
        }
    }

    fn sample() -> Vec<CatalogEntry> {
        vec![
            entry("005930", "삼성전자", "반도체", Some(3.0), Some(500)),
            entry("000660", "SK하이닉스", "반도체", Some(7.5), Some(-10)),
            entry("051910", "LG화학", "화학", Some(-2.0), Some(20)),
            entry("373220", "LG에너지솔루션", "배터리", None, None),
        ]
    }

    #[test]
    fn filters_compose() {
        let q = ScreenerQuery {
            sector: Some("반도체".into()),
            foreign_net_positive: true,
            page: 1,
            page_size: 10,
            ..Default::default()
        };
        let page = screen(sample(), &q);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].ticker, "005930");
    }

    #[test]
    fn substring_matches_name_or_ticker() {
        let q = ScreenerQuery {
            query: Some("하이닉스".into()),
            page: 1,
            page_size: 10,
            ..Default::default()
        };
        assert_eq!(screen(sample(), &q).items[0].ticker, "000660");
    }

    #[test]
    fn sort_desc_puts_missing_last() {
        let q = ScreenerQuery {
            sort_by: Some(SortKey::WeeklyReturn),
            sort_dir: Some(SortDir::Desc),
            page: 1,
            page_size: 10,
            ..Default::default()
        };
        let page = screen(sample(), &q);
        assert_eq!(page.items.first().unwrap().ticker, "000660");
        assert_eq!(page.items.last().unwrap().ticker, "373220");
    }

    #[test]
    fn paging_is_one_based() {
        let q = ScreenerQuery {
            sort_by: Some(SortKey::Name),
            sort_dir: Some(SortDir::Asc),
            page: 2,
            page_size: 2,
            ..Default::default()
        };
        let page = screen(sample(), &q);
        assert_eq!(page.total, 4);
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn themes_group_and_average() {
        let groups = themes(sample());
        let semis = groups.iter().find(|g| g.sector == "반도체").unwrap();
        assert_eq!(semis.count, 2);
        assert!((semis.avg_weekly_return.unwrap() - 5.25).abs() < 1e-9);
        assert_eq!(semis.top[0].ticker, "000660");
    }

    #[test]
    fn presets_respect_their_filters() {
        let entries = sample();
        let recs = recommendations(&entries, 10);
        assert_eq!(recs["foreign-buy-surge"].len(), 2);
        assert!(recs["foreign-buy-surge"]
            .iter()
            .all(|e| e.foreign_net.unwrap() > 0));
        assert_eq!(recs["weekly-drop"].first().unwrap().ticker, "051910");
    }
}
