//! Upstream market-data capability.
//!
//! The collector only ever talks to [`UpstreamApi`]; the concrete
//! [`NaverClient`] reads Naver Finance JSON endpoints, and tests drive the
//! pipeline with fixture implementations instead of the network.

mod http;
mod naver;
mod rate_limit;
mod wire;

pub use http::UpstreamHttp;
pub use naver::NaverClient;
pub use rate_limit::HostRateLimiter;

use crate::models::{
    CatalogEntry, DailyBar, EtfFundamentals, EtfHolding, IntradayTick, NewsItem,
    StockFundamentals, TickerValidation, TradingFlow,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Still throttled after all retry attempts.
    #[error("upstream rate limited")]
    RateLimited,
    /// Permanent failure (non-429 4xx) or retries exhausted. Carries a
    /// machine-readable reason.
    #[error("upstream unavailable ({reason})")]
    Unavailable { reason: String },
    /// Response arrived but did not match the expected shape.
    #[error("upstream response unparseable: {0}")]
    Parse(String),
}

impl UpstreamError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        UpstreamError::Unavailable {
            reason: reason.into(),
        }
    }
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Capability set required by the collector. Most-recent-first ordering is
/// acceptable for the list-returning methods; the store sorts on write.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    async fn fetch_daily_bars(&self, ticker: &str, days: u32) -> UpstreamResult<Vec<DailyBar>>;

    async fn fetch_trading_flows(&self, ticker: &str, days: u32) -> UpstreamResult<Vec<TradingFlow>>;

    async fn fetch_intraday_ticks(&self, ticker: &str, pages: u32) -> UpstreamResult<Vec<IntradayTick>>;

    /// `keywords` come from the watchlist entry (`search_keyword` plus
    /// `relevance_keywords`) and drive the relevance score.
    async fn fetch_news(&self, ticker: &str, days: u32, keywords: &[String]) -> UpstreamResult<Vec<NewsItem>>;

    async fn fetch_stock_fundamentals(&self, ticker: &str) -> UpstreamResult<StockFundamentals>;

    async fn fetch_etf_fundamentals(&self, ticker: &str) -> UpstreamResult<EtfFundamentals>;

    async fn fetch_etf_holdings(&self, ticker: &str) -> UpstreamResult<Vec<EtfHolding>>;

    /// Full KOSPI/KOSDAQ/ETF universe crawl.
    async fn fetch_catalog(&self) -> UpstreamResult<Vec<CatalogEntry>>;

    async fn validate_ticker(&self, ticker: &str) -> UpstreamResult<TickerValidation>;
}
