//! Core domain entities shared across store, collector, analytics and API.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Korean market zone: fixed +09:00, no DST.
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("fixed KST offset")
}

/// Today's trading date in KST.
pub fn today_kst() -> NaiveDate {
    Utc::now().with_timezone(&kst()).date_naive()
}

/// Instrument class of a watchlist or catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    #[serde(rename = "ETF")]
    Etf,
    #[serde(rename = "STOCK")]
    Stock,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Etf => "ETF",
            AssetType::Stock => "STOCK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ETF" => Some(AssetType::Etf),
            "STOCK" => Some(AssetType::Stock),
            _ => None,
        }
    }
}

/// A registered watchlist entry. The watchlist is the curated subset of the
/// catalog that ingestion and analytics operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerInfo {
    pub ticker: String,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    #[serde(default)]
    pub theme: String,
    pub launch_date: Option<NaiveDate>,
    pub expense_ratio: Option<f64>,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_price: Option<f64>,
    pub quantity: Option<f64>,
    pub search_keyword: Option<String>,
    #[serde(default)]
    pub relevance_keywords: Vec<String>,
    #[serde(default)]
    pub display_order: i64,
}

/// One day of OHLCV data. `daily_change_pct` is derived at write time from
/// the latest persisted close strictly earlier than `date`; it is `None` for
/// the earliest row of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub daily_change_pct: Option<f64>,
}

/// Daily net buy/sell per investor category, signed, units as delivered by
/// the upstream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingFlow {
    pub ticker: String,
    pub date: NaiveDate,
    pub individual_net: i64,
    pub institutional_net: i64,
    pub foreign_net: i64,
}

/// Within-session price sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayTick {
    pub ticker: String,
    pub datetime: DateTime<Utc>,
    pub price: f64,
    pub change_amount: f64,
    pub volume: i64,
    pub bid_volume: i64,
    pub ask_volume: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

/// News article linked to a ticker, deduplicated on `(ticker, url)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub ticker: String,
    pub date: NaiveDate,
    pub title: String,
    pub url: String,
    pub source: String,
    /// Keyword-overlap match strength in [0, 1].
    pub relevance_score: f64,
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockFundamentals {
    pub ticker: String,
    pub date: NaiveDate,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub roe: Option<f64>,
    pub eps: Option<f64>,
    pub bps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtfFundamentals {
    pub ticker: String,
    pub date: NaiveDate,
    pub nav: Option<f64>,
    pub expense_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtfHolding {
    pub ticker: String,
    pub date: NaiveDate,
    pub constituent_ticker: String,
    pub name: String,
    pub weight: f64,
}

/// Per-ticker ingestion bookkeeping that drives smart collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionState {
    pub ticker: String,
    pub last_price_date: Option<NaiveDate>,
    pub last_trading_flow_date: Option<NaiveDate>,
    pub last_news_collected_at: Option<DateTime<Utc>>,
    pub price_records_count: i64,
    pub trading_flow_records_count: i64,
    pub news_records_count: i64,
    pub last_collection_attempt: Option<DateTime<Utc>>,
    pub last_successful_collection: Option<DateTime<Utc>>,
    pub consecutive_failures: i64,
}

impl CollectionState {
    pub fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Buy,
    Sell,
    PriceChange,
    TradingSignal,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Buy => "buy",
            AlertType::Sell => "sell",
            AlertType::PriceChange => "price_change",
            AlertType::TradingSignal => "trading_signal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(AlertType::Buy),
            "sell" => Some(AlertType::Sell),
            "price_change" => Some(AlertType::PriceChange),
            "trading_signal" => Some(AlertType::TradingSignal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    Above,
    Below,
    Both,
}

impl AlertDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertDirection::Above => "above",
            AlertDirection::Below => "below",
            AlertDirection::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "above" => Some(AlertDirection::Above),
            "below" => Some(AlertDirection::Below),
            "both" => Some(AlertDirection::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub ticker: String,
    pub alert_type: AlertType,
    pub direction: AlertDirection,
    /// Price level for buy/sell, percent for price_change, 0 for
    /// trading_signal.
    pub target_price: f64,
    #[serde(default)]
    pub memo: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    pub id: i64,
    pub rule_id: i64,
    pub ticker: String,
    pub alert_type: AlertType,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
}

/// Discoverable universe entry with denormalized snapshot columns consumed
/// by the screener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub ticker: String,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub market: String,
    #[serde(default)]
    pub sector: String,
    pub listed_date: Option<NaiveDate>,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub close_price: Option<f64>,
    pub daily_change_pct: Option<f64>,
    pub volume: Option<i64>,
    pub weekly_return: Option<f64>,
    pub foreign_net: Option<i64>,
    pub institutional_net: Option<i64>,
    pub catalog_updated_at: Option<DateTime<Utc>>,
}

/// Analysis window accepted by insights and metrics endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl Period {
    pub fn days(&self) -> i64 {
        match self {
            Period::OneWeek => 7,
            Period::OneMonth => 30,
            Period::ThreeMonths => 90,
            Period::SixMonths => 180,
            Period::OneYear => 365,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1w" => Some(Period::OneWeek),
            "1m" => Some(Period::OneMonth),
            "3m" => Some(Period::ThreeMonths),
            "6m" => Some(Period::SixMonths),
            "1y" => Some(Period::OneYear),
            _ => None,
        }
    }
}

/// Result of an upstream ticker lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerValidation {
    pub valid: bool,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
}
