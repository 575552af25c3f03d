//! Shared fixtures: a scripted upstream that drives the whole pipeline
//! without network, plus helpers for issuing requests against the router.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate};
use etfwatch_backend::{
    api::{build_router, AppContext},
    cache::Cache,
    collector::Collector,
    config::Config,
    models::*,
    scheduler::Scheduler,
    store::Store,
    upstream::{UpstreamApi, UpstreamResult},
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

/// Upstream driven by pre-scripted per-ticker history. Every fetch is
/// recorded so tests can assert how much was requested.
#[derive(Default)]
pub struct ScriptedUpstream {
    bars: Mutex<HashMap<String, Vec<DailyBar>>>,
    flows: Mutex<HashMap<String, Vec<TradingFlow>>>,
    news: Mutex<HashMap<String, Vec<NewsItem>>>,
    ticks: Mutex<HashMap<String, Vec<IntradayTick>>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `count` consecutive-day bars ending today (KST), linearly
    /// spaced from `start_close` to `end_close`.
    pub fn seed_bar_history(&self, ticker: &str, count: usize, start_close: f64, end_close: f64) {
        let today = today_kst();
        let step = if count > 1 {
            (end_close - start_close) / (count as f64 - 1.0)
        } else {
            0.0
        };
        let bars: Vec<DailyBar> = (0..count)
            .map(|i| {
                let close = start_close + step * i as f64;
                DailyBar {
                    ticker: ticker.to_string(),
                    date: today - Duration::days((count - 1 - i) as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1_000,
                    daily_change_pct: None,
                }
            })
            .collect();
        self.bars.lock().insert(ticker.to_string(), bars);
    }

    pub fn seed_flow_history(&self, ticker: &str, count: usize) {
        let today = today_kst();
        let flows: Vec<TradingFlow> = (0..count)
            .map(|i| TradingFlow {
                ticker: ticker.to_string(),
                date: today - Duration::days((count - 1 - i) as i64),
                individual_net: -50,
                institutional_net: 20,
                foreign_net: 30,
            })
            .collect();
        self.flows.lock().insert(ticker.to_string(), flows);
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UpstreamApi for ScriptedUpstream {
    async fn fetch_daily_bars(&self, ticker: &str, days: u32) -> UpstreamResult<Vec<DailyBar>> {
        self.calls.lock().push(format!("bars:{ticker}:{days}"));
        let bars = self.bars.lock().get(ticker).cloned().unwrap_or_default();
        let skip = bars.len().saturating_sub(days as usize);
        Ok(bars.into_iter().skip(skip).collect())
    }

    async fn fetch_trading_flows(&self, ticker: &str, days: u32) -> UpstreamResult<Vec<TradingFlow>> {
        self.calls.lock().push(format!("flows:{ticker}:{days}"));
        let flows = self.flows.lock().get(ticker).cloned().unwrap_or_default();
        let skip = flows.len().saturating_sub(days as usize);
        Ok(flows.into_iter().skip(skip).collect())
    }

    async fn fetch_intraday_ticks(&self, ticker: &str, pages: u32) -> UpstreamResult<Vec<IntradayTick>> {
        self.calls.lock().push(format!("ticks:{ticker}:{pages}"));
        Ok(self.ticks.lock().get(ticker).cloned().unwrap_or_default())
    }

    async fn fetch_news(&self, ticker: &str, days: u32, _keywords: &[String]) -> UpstreamResult<Vec<NewsItem>> {
        self.calls.lock().push(format!("news:{ticker}:{days}"));
        Ok(self.news.lock().get(ticker).cloned().unwrap_or_default())
    }

    async fn fetch_stock_fundamentals(&self, ticker: &str) -> UpstreamResult<StockFundamentals> {
        self.calls.lock().push(format!("stock_fundamentals:{ticker}"));
        Ok(StockFundamentals {
            ticker: ticker.to_string(),
            date: today_kst(),
            per: Some(12.0),
            pbr: Some(1.1),
            roe: Some(9.5),
            eps: Some(5000.0),
            bps: Some(52000.0),
        })
    }

    async fn fetch_etf_fundamentals(&self, ticker: &str) -> UpstreamResult<EtfFundamentals> {
        self.calls.lock().push(format!("etf_fundamentals:{ticker}"));
        Ok(EtfFundamentals {
            ticker: ticker.to_string(),
            date: today_kst(),
            nav: Some(10523.0),
            expense_ratio: Some(0.45),
        })
    }

    async fn fetch_etf_holdings(&self, ticker: &str) -> UpstreamResult<Vec<EtfHolding>> {
        self.calls.lock().push(format!("etf_holdings:{ticker}"));
        Ok(vec![EtfHolding {
            ticker: ticker.to_string(),
            date: today_kst(),
            constituent_ticker: "005930".into(),
            name: "삼성전자".into(),
            weight: 12.5,
        }])
    }

    async fn fetch_catalog(&self) -> UpstreamResult<Vec<CatalogEntry>> {
        self.calls.lock().push("catalog".into());
        Ok(vec![])
    }

    async fn validate_ticker(&self, ticker: &str) -> UpstreamResult<TickerValidation> {
        self.calls.lock().push(format!("validate:{ticker}"));
        let known = self.bars.lock().contains_key(ticker);
        Ok(TickerValidation {
            valid: known,
            name: known.then(|| format!("name-{ticker}")),
            asset_type: known.then_some(AssetType::Etf),
        })
    }
}

pub struct TestApp {
    pub state: Arc<AppContext>,
    pub upstream: Arc<ScriptedUpstream>,
    pub router: Router,
}

pub fn test_app(upstream: Arc<ScriptedUpstream>) -> TestApp {
    let config = Config::default();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let cache = Arc::new(Cache::new(config.cache_max_size));
    let upstream_dyn: Arc<dyn UpstreamApi> = Arc::clone(&upstream) as Arc<dyn UpstreamApi>;
    let collector = Arc::new(Collector::new(
        Arc::clone(&store),
        Arc::clone(&upstream_dyn),
        Arc::clone(&cache),
    ));
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&collector), 30, None));
    let state = Arc::new(AppContext {
        config,
        store,
        cache,
        collector,
        upstream: upstream_dyn,
        scheduler,
    });
    TestApp {
        state: Arc::clone(&state),
        upstream,
        router: build_router(state),
    }
}

pub fn register_etf(app: &TestApp, ticker: &str, name: &str) {
    app.state
        .store
        .add_ticker(&TickerInfo {
            ticker: ticker.to_string(),
            name: name.to_string(),
            asset_type: AssetType::Etf,
            theme: String::new(),
            launch_date: None,
            expense_ratio: None,
            purchase_date: None,
            purchase_price: None,
            quantity: None,
            search_keyword: None,
            relevance_keywords: vec![],
            display_order: 0,
        })
        .unwrap();
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response: Response<Body> = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

pub fn post_empty(path: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn seed_store_bars(app: &TestApp, ticker: &str, closes: &[(NaiveDate, f64)]) {
    let bars: Vec<DailyBar> = closes
        .iter()
        .map(|&(date, close)| DailyBar {
            ticker: ticker.to_string(),
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
            daily_change_pct: None,
        })
        .collect();
    app.state.store.upsert_daily_bars(&bars).unwrap();
}
