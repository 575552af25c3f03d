//! Naver Finance client: the production [`UpstreamApi`] implementation.
//!
//! Endpoint shapes live in [`super::wire`]; this module maps them onto the
//! domain models and owns the request plumbing via [`UpstreamHttp`].

use super::wire::{self, parse_compact_date, parse_compact_datetime, parse_int, parse_num};
use super::{UpstreamApi, UpstreamError, UpstreamHttp, UpstreamResult};
use crate::models::{
    today_kst, AssetType, CatalogEntry, DailyBar, EtfFundamentals, EtfHolding, IntradayTick,
    NewsItem, Sentiment, StockFundamentals, TickerValidation, TradingFlow,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info};

const DEFAULT_API_BASE: &str = "https://api.stock.naver.com";
const DEFAULT_MOBILE_BASE: &str = "https://m.stock.naver.com";
const DEFAULT_SISE_BASE: &str = "https://finance.naver.com";

const CATALOG_PAGE_SIZE: u32 = 100;
const CATALOG_MAX_PAGES: u32 = 40;

const POSITIVE_WORDS: &[&str] = &["상승", "급등", "호재", "최고", "돌파", "성장", "확대"];
const NEGATIVE_WORDS: &[&str] = &["하락", "급락", "악재", "최저", "우려", "부진", "축소"];

pub struct NaverClient {
    http: UpstreamHttp,
    api_base: String,
    mobile_base: String,
    sise_base: String,
}

impl NaverClient {
    pub fn new(http: UpstreamHttp) -> Self {
        Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            mobile_base: DEFAULT_MOBILE_BASE.to_string(),
            sise_base: DEFAULT_SISE_BASE.to_string(),
        }
    }

    /// Point every endpoint family at a test server.
    #[doc(hidden)]
    pub fn with_base_url(http: UpstreamHttp, base: &str) -> Self {
        Self {
            http,
            api_base: base.to_string(),
            mobile_base: base.to_string(),
            sise_base: base.to_string(),
        }
    }

}

/// Keyword-overlap relevance in [0, 1]: the fraction of registered keywords
/// appearing in the title. Without keywords every article scores a neutral
/// 0.5.
pub fn score_relevance(title: &str, keywords: &[String]) -> (f64, Vec<String>) {
    let usable: Vec<&String> = keywords.iter().filter(|k| !k.trim().is_empty()).collect();
    if usable.is_empty() {
        return (0.5, Vec::new());
    }
    let matched: Vec<String> = usable
        .iter()
        .filter(|k| title.contains(k.as_str()))
        .map(|k| k.to_string())
        .collect();
    let score = matched.len() as f64 / usable.len() as f64;
    (score.clamp(0.0, 1.0), matched)
}

/// Coarse headline polarity from a fixed word list.
pub fn classify_sentiment(title: &str) -> Option<Sentiment> {
    let pos = POSITIVE_WORDS.iter().filter(|w| title.contains(*w)).count();
    let neg = NEGATIVE_WORDS.iter().filter(|w| title.contains(*w)).count();
    match (pos, neg) {
        (0, 0) => None,
        (p, n) if p > n => Some(Sentiment::Positive),
        (p, n) if n > p => Some(Sentiment::Negative),
        _ => Some(Sentiment::Neutral),
    }
}

#[async_trait]
impl UpstreamApi for NaverClient {
    async fn fetch_daily_bars(&self, ticker: &str, days: u32) -> UpstreamResult<Vec<DailyBar>> {
        let url = format!(
            "{}/chart/domestic/item/{}/day?count={}",
            self.api_base, ticker, days
        );
        let rows: Vec<wire::DailyPriceRow> = self.http.get_json(&url).await?;
        let bars: Vec<DailyBar> = rows
            .iter()
            .filter_map(|row| {
                Some(DailyBar {
                    ticker: ticker.to_string(),
                    date: parse_compact_date(&row.local_date)?,
                    open: parse_num(&row.open_price)?,
                    high: parse_num(&row.high_price)?,
                    low: parse_num(&row.low_price)?,
                    close: parse_num(&row.close_price)?,
                    volume: parse_int(&row.volume).unwrap_or(0),
                    daily_change_pct: None,
                })
            })
            .collect();
        if bars.is_empty() && !rows.is_empty() {
            return Err(UpstreamError::Parse(format!(
                "daily bars for {ticker}: no parseable rows"
            )));
        }
        debug!(%ticker, count = bars.len(), "fetched daily bars");
        Ok(bars)
    }

    async fn fetch_trading_flows(&self, ticker: &str, days: u32) -> UpstreamResult<Vec<TradingFlow>> {
        let url = format!(
            "{}/stock/{}/investorTrend?count={}",
            self.api_base, ticker, days
        );
        let rows: Vec<wire::InvestorTrendRow> = self.http.get_json(&url).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(TradingFlow {
                    ticker: ticker.to_string(),
                    date: parse_compact_date(&row.bizdate)?,
                    individual_net: parse_int(&row.individual_net)?,
                    institutional_net: parse_int(&row.institutional_net)?,
                    foreign_net: parse_int(&row.foreign_net)?,
                })
            })
            .collect())
    }

    async fn fetch_intraday_ticks(&self, ticker: &str, pages: u32) -> UpstreamResult<Vec<IntradayTick>> {
        let mut ticks = Vec::new();
        for page in 1..=pages.max(1) {
            let url = format!(
                "{}/chart/domestic/item/{}/minute?page={}&pageSize=100",
                self.api_base, ticker, page
            );
            let rows: Vec<wire::MinutePriceRow> = self.http.get_json(&url).await?;
            if rows.is_empty() {
                break;
            }
            ticks.extend(rows.iter().filter_map(|row| {
                Some(IntradayTick {
                    ticker: ticker.to_string(),
                    datetime: parse_compact_datetime(&row.local_datetime)?,
                    price: parse_num(&row.current_price)?,
                    change_amount: row
                        .change_amount
                        .as_deref()
                        .and_then(parse_num)
                        .unwrap_or(0.0),
                    volume: parse_int(&row.volume).unwrap_or(0),
                    bid_volume: row.bid_volume.as_deref().and_then(parse_int).unwrap_or(0),
                    ask_volume: row.ask_volume.as_deref().and_then(parse_int).unwrap_or(0),
                })
            }));
        }
        Ok(ticks)
    }

    async fn fetch_news(
        &self,
        ticker: &str,
        days: u32,
        keywords: &[String],
    ) -> UpstreamResult<Vec<NewsItem>> {
        let url = format!(
            "{}/api/news/stock/{}?page=1&pageSize=60",
            self.mobile_base, ticker
        );
        let page: wire::NewsPage = self.http.get_json(&url).await?;
        let cutoff = today_kst() - Duration::days(i64::from(days));

        Ok(page
            .items
            .iter()
            .filter_map(|row| {
                let date = parse_compact_date(row.datetime.get(0..8)?)?;
                if date < cutoff {
                    return None;
                }
                let (relevance_score, tags) = score_relevance(&row.title, keywords);
                Some(NewsItem {
                    ticker: ticker.to_string(),
                    date,
                    title: row.title.clone(),
                    url: row.link_url.clone(),
                    source: row.office_name.clone(),
                    relevance_score,
                    sentiment: classify_sentiment(&row.title),
                    tags,
                })
            })
            .collect())
    }

    async fn fetch_stock_fundamentals(&self, ticker: &str) -> UpstreamResult<StockFundamentals> {
        let url = format!("{}/stock/{}/integration", self.api_base, ticker);
        let payload: wire::StockIntegration = self.http.get_json(&url).await?;

        let lookup = |code: &str| {
            payload
                .total_infos
                .iter()
                .find(|info| info.code.eq_ignore_ascii_case(code))
                .and_then(|info| info.value.as_deref())
                .and_then(parse_num)
        };

        Ok(StockFundamentals {
            ticker: ticker.to_string(),
            date: today_kst(),
            per: lookup("per"),
            pbr: lookup("pbr"),
            roe: lookup("roe"),
            eps: lookup("eps"),
            bps: lookup("bps"),
        })
    }

    async fn fetch_etf_fundamentals(&self, ticker: &str) -> UpstreamResult<EtfFundamentals> {
        let url = format!("{}/etf/{}/basic", self.api_base, ticker);
        let payload: wire::EtfBasic = self.http.get_json(&url).await?;
        Ok(EtfFundamentals {
            ticker: ticker.to_string(),
            date: today_kst(),
            nav: payload.nav.as_deref().and_then(parse_num),
            expense_ratio: payload.total_expense_ratio.as_deref().and_then(parse_num),
        })
    }

    async fn fetch_etf_holdings(&self, ticker: &str) -> UpstreamResult<Vec<EtfHolding>> {
        let url = format!("{}/etf/{}/currentComposition", self.api_base, ticker);
        let payload: wire::EtfComposition = self.http.get_json(&url).await?;
        let date = today_kst();
        Ok(payload
            .items
            .iter()
            .map(|row| EtfHolding {
                ticker: ticker.to_string(),
                date,
                constituent_ticker: row.item_code.clone(),
                name: row.item_name.clone(),
                weight: row.weight.as_deref().and_then(parse_num).unwrap_or(0.0),
            })
            .collect())
    }

    async fn fetch_catalog(&self) -> UpstreamResult<Vec<CatalogEntry>> {
        let now = Utc::now();
        let mut entries = Vec::new();

        for market in ["KOSPI", "KOSDAQ"] {
            for page in 1..=CATALOG_MAX_PAGES {
                let url = format!(
                    "{}/stock/exchange/{}/marketValue?page={}&pageSize={}",
                    self.api_base, market, page, CATALOG_PAGE_SIZE
                );
                let batch: wire::ExchangePage = self.http.get_json(&url).await?;
                if batch.stocks.is_empty() {
                    break;
                }
                let fetched = page * CATALOG_PAGE_SIZE;
                entries.extend(batch.stocks.iter().map(|row| CatalogEntry {
                    ticker: row.item_code.clone(),
                    name: row.stock_name.clone(),
                    asset_type: AssetType::Stock,
                    market: market.to_string(),
                    sector: row
                        .industry
                        .as_ref()
                        .map(|i| i.industry_group.clone())
                        .unwrap_or_default(),
                    listed_date: row.listed_date.as_deref().and_then(parse_compact_date),
                    last_updated: Some(now),
                    is_active: true,
                    close_price: None,
                    daily_change_pct: None,
                    volume: None,
                    weekly_return: None,
                    foreign_net: None,
                    institutional_net: None,
                    catalog_updated_at: None,
                }));
                if fetched >= batch.total_count {
                    break;
                }
            }
        }

        let etf_url = format!("{}/api/sise/etfItemList.nhn", self.sise_base);
        let etfs: wire::EtfItemList = self.http.get_json(&etf_url).await?;
        entries.extend(etfs.result.etf_item_list.iter().map(|row| CatalogEntry {
            ticker: row.itemcode.clone(),
            name: row.itemname.clone(),
            asset_type: AssetType::Etf,
            market: "ETF".to_string(),
            sector: "ETF".to_string(),
            listed_date: None,
            last_updated: Some(now),
            is_active: true,
            close_price: None,
            daily_change_pct: None,
            volume: None,
            weekly_return: None,
            foreign_net: None,
            institutional_net: None,
            catalog_updated_at: None,
        }));

        info!(count = entries.len(), "fetched ticker catalog");
        Ok(entries)
    }

    async fn validate_ticker(&self, ticker: &str) -> UpstreamResult<TickerValidation> {
        let url = format!("{}/stock/{}/basic", self.api_base, ticker);
        match self.http.get_json::<wire::StockBasic>(&url).await {
            Ok(basic) => {
                let asset_type = basic.stock_end_type.as_deref().map(|t| {
                    if t.eq_ignore_ascii_case("etf") {
                        AssetType::Etf
                    } else {
                        AssetType::Stock
                    }
                });
                Ok(TickerValidation {
                    valid: basic.stock_name.is_some(),
                    name: basic.stock_name,
                    asset_type,
                })
            }
            // An unknown code comes back 404; report invalid instead of
            // failing the request.
            Err(UpstreamError::Unavailable { reason }) if reason.contains("status 404") => {
                Ok(TickerValidation {
                    valid: false,
                    name: None,
                    asset_type: None,
                })
            }
            Err(e) => Err(e),
        }
    }
}
