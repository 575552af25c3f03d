//! Shared fixtures for unit tests.

use crate::api::AppContext;
use crate::cache::Cache;
use crate::collector::Collector;
use crate::config::Config;
use crate::models::*;
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::upstream::{UpstreamApi, UpstreamError, UpstreamResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Upstream that returns nothing; for wiring-only tests.
pub struct NoopUpstream;

#[async_trait]
impl UpstreamApi for NoopUpstream {
    async fn fetch_daily_bars(&self, _: &str, _: u32) -> UpstreamResult<Vec<DailyBar>> {
        Ok(vec![])
    }
    async fn fetch_trading_flows(&self, _: &str, _: u32) -> UpstreamResult<Vec<TradingFlow>> {
        Ok(vec![])
    }
    async fn fetch_intraday_ticks(&self, _: &str, _: u32) -> UpstreamResult<Vec<IntradayTick>> {
        Ok(vec![])
    }
    async fn fetch_news(&self, _: &str, _: u32, _: &[String]) -> UpstreamResult<Vec<NewsItem>> {
        Ok(vec![])
    }
    async fn fetch_stock_fundamentals(&self, _: &str) -> UpstreamResult<StockFundamentals> {
        Err(UpstreamError::unavailable("noop"))
    }
    async fn fetch_etf_fundamentals(&self, _: &str) -> UpstreamResult<EtfFundamentals> {
        Err(UpstreamError::unavailable("noop"))
    }
    async fn fetch_etf_holdings(&self, _: &str) -> UpstreamResult<Vec<EtfHolding>> {
        Ok(vec![])
    }
    async fn fetch_catalog(&self) -> UpstreamResult<Vec<CatalogEntry>> {
        Ok(vec![])
    }
    async fn validate_ticker(&self, _: &str) -> UpstreamResult<TickerValidation> {
        Ok(TickerValidation {
            valid: false,
            name: None,
            asset_type: None,
        })
    }
}

/// In-memory application context around the given upstream.
pub fn app_state_with(upstream: Arc<dyn UpstreamApi>, config: Config) -> Arc<AppContext> {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let cache = Arc::new(Cache::new(config.cache_max_size));
    let collector = Arc::new(Collector::new(
        Arc::clone(&store),
        Arc::clone(&upstream),
        Arc::clone(&cache),
    ));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&collector),
        config.default_collect_days,
        config.scheduler_interval_minutes,
    ));
    Arc::new(AppContext {
        config,
        store,
        cache,
        collector,
        upstream,
        scheduler,
    })
}
