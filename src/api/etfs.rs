//! Watchlist ticker endpoints: series reads, derived analytics, prompts
//! and single-ticker collection.

use super::{no_cache_requested, parse_date_opt, require_api_key, validate_days, AppState};
use crate::analytics::{build_insights, compare_series, compute_metrics, prompt};
use crate::cache::{kind_tag, ticker_tag, CacheTtl};
use crate::error::ApiError;
use crate::models::{today_kst, AssetType, Period, TickerInfo};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

const DEFAULT_RANGE_DAYS: i64 = 90;
const MAX_COMPARE_TICKERS: usize = 20;
const MAX_COLLECT_DAYS: u32 = 365;
const MAX_INTRADAY_PAGES: u32 = 100;

fn lookup_ticker(state: &AppState, ticker: &str) -> Result<TickerInfo, ApiError> {
    state
        .store
        .get_ticker(ticker)?
        .ok_or_else(|| ApiError::not_found(format!("ticker {ticker}")))
}

/// Resolve a `[start, end]` window from either explicit dates or a
/// trailing-days count.
fn resolve_range(
    start_date: Option<&String>,
    end_date: Option<&String>,
    days: Option<i64>,
) -> Result<(NaiveDate, NaiveDate), ApiError> {
    let end = parse_date_opt(end_date, "end_date")?.unwrap_or_else(today_kst);
    let start = match parse_date_opt(start_date, "start_date")? {
        Some(s) => s,
        None => {
            let span = days.unwrap_or(DEFAULT_RANGE_DAYS);
            if span <= 0 {
                return Err(ApiError::validation("days must be positive"));
            }
            end - Duration::days(span)
        }
    };
    if end < start {
        return Err(ApiError::validation("end_date must not precede start_date"));
    }
    Ok((start, end))
}

pub async fn list_etfs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let bypass = no_cache_requested(&headers);
    if let Some(hit) = state.cache.get("watchlist", bypass) {
        return Ok(Json(hit));
    }
    let tickers = state.store.list_tickers()?;
    let value = serde_json::to_value(&tickers).map_err(|e| ApiError::Internal(e.to_string()))?;
    state
        .cache
        .set("watchlist", value.clone(), CacheTtl::Normal, &[kind_tag("watchlist")]);
    Ok(Json(value))
}

pub async fn etf_detail(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let info = lookup_ticker(&state, &ticker)?;
    let latest_bar = state.store.latest_bar(&ticker)?;
    let latest_flow = state.store.latest_trading_flow(&ticker)?;
    let collection_state = state.store.collection_state(&ticker)?;
    Ok(Json(json!({
        "info": info,
        "latest_bar": latest_bar,
        "latest_flow": latest_flow,
        "collection_state": collection_state,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub days: Option<i64>,
    #[serde(default)]
    pub auto_collect: bool,
}

pub async fn prices(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<RangeQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    lookup_ticker(&state, &ticker)?;
    let (start, end) = resolve_range(
        query.start_date.as_ref(),
        query.end_date.as_ref(),
        query.days,
    )?;

    if query.auto_collect {
        // Gap-heal before serving; committed rows stay even if it fails.
        if let Err(e) = state.collector.ensure_price_coverage(&ticker, end).await {
            tracing::warn!(%ticker, error = %e, "auto-collect failed, serving stored bars");
        }
    }

    let key = format!("prices:{ticker}:{start}:{end}");
    let bypass = no_cache_requested(&headers);
    if let Some(hit) = state.cache.get(&key, bypass) {
        return Ok(Json(hit));
    }

    let bars = state.store.bars(&ticker, start, end)?;
    let value = serde_json::to_value(&bars).map_err(|e| ApiError::Internal(e.to_string()))?;
    state.cache.set(
        &key,
        value.clone(),
        CacheTtl::Fast,
        &[ticker_tag(&ticker), kind_tag("prices")],
    );
    Ok(Json(value))
}

pub async fn trading_flow(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<RangeQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    lookup_ticker(&state, &ticker)?;
    let (start, end) = resolve_range(
        query.start_date.as_ref(),
        query.end_date.as_ref(),
        query.days,
    )?;

    let key = format!("flows:{ticker}:{start}:{end}");
    let bypass = no_cache_requested(&headers);
    if let Some(hit) = state.cache.get(&key, bypass) {
        return Ok(Json(hit));
    }

    let flows = state.store.trading_flows(&ticker, start, end)?;
    let value = serde_json::to_value(&flows).map_err(|e| ApiError::Internal(e.to_string()))?;
    state.cache.set(
        &key,
        value.clone(),
        CacheTtl::Fast,
        &[ticker_tag(&ticker), kind_tag("flows")],
    );
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

fn parse_period(s: Option<&String>) -> Result<Period, ApiError> {
    match s {
        None => Ok(Period::ThreeMonths),
        Some(raw) => Period::parse(raw)
            .ok_or_else(|| ApiError::validation("period must be one of 1w, 1m, 3m, 6m, 1y")),
    }
}

pub async fn metrics(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<PeriodQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    lookup_ticker(&state, &ticker)?;
    let period = parse_period(query.period.as_ref())?;

    let key = format!("metrics:{ticker}:{}", period.days());
    let bypass = no_cache_requested(&headers);
    if let Some(hit) = state.cache.get(&key, bypass) {
        return Ok(Json(hit));
    }

    let start = today_kst() - Duration::days(period.days());
    let bars = state.store.bars(&ticker, start, today_kst())?;
    let metrics = compute_metrics(&bars, 0.0)
        .ok_or_else(|| ApiError::validation("not enough price data for metrics"))?;
    let value = serde_json::to_value(&metrics).map_err(|e| ApiError::Internal(e.to_string()))?;
    state.cache.set(
        &key,
        value.clone(),
        CacheTtl::Normal,
        &[ticker_tag(&ticker), kind_tag("metrics")],
    );
    Ok(Json(value))
}

pub async fn insights(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Value>, ApiError> {
    lookup_ticker(&state, &ticker)?;
    let period = parse_period(query.period.as_ref())?;

    let today = today_kst();
    let start = today - Duration::days(period.days().max(90));
    let bars = state.store.bars(&ticker, start, today)?;
    let flows = state
        .store
        .trading_flows(&ticker, today - Duration::days(30), today)?;
    let news = state.store.recent_news(&ticker, 10)?;

    let insights = build_insights(&ticker, &bars, &flows, &news);
    Ok(Json(serde_json::to_value(&insights).map_err(|e| ApiError::Internal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
pub struct IntradayQuery {
    pub target_date: Option<String>,
    #[serde(default)]
    pub auto_collect: bool,
    #[serde(default)]
    pub force_refresh: bool,
}

pub async fn intraday(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<IntradayQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    lookup_ticker(&state, &ticker)?;
    let date = parse_date_opt(query.target_date.as_ref(), "target_date")?.unwrap_or_else(today_kst);

    if query.force_refresh {
        state.collector.collect_intraday(&ticker, 10).await?;
    }

    let key = format!("intraday:{ticker}:{date}");
    let bypass = no_cache_requested(&headers) || query.force_refresh;
    if let Some(hit) = state.cache.get(&key, bypass) {
        return Ok(Json(hit));
    }

    let mut ticks = state.store.intraday_ticks(&ticker, date)?;
    if ticks.is_empty() && query.auto_collect && date == today_kst() {
        state.collector.collect_intraday(&ticker, 10).await?;
        ticks = state.store.intraday_ticks(&ticker, date)?;
    }

    let value = serde_json::to_value(&ticks).map_err(|e| ApiError::Internal(e.to_string()))?;
    // An empty array never enters the cache, so later calls retry upstream.
    state.cache.set(
        &key,
        value.clone(),
        CacheTtl::Fast,
        &[ticker_tag(&ticker), kind_tag("intraday")],
    );
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub tickers: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn compare(
    State(state): State<AppState>,
    Query(query): Query<CompareQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let tickers: Vec<String> = query
        .tickers
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tickers.len() < 2 {
        return Err(ApiError::validation("compare requires at least 2 tickers"));
    }
    if tickers.len() > MAX_COMPARE_TICKERS {
        return Err(ApiError::validation(format!(
            "compare accepts at most {MAX_COMPARE_TICKERS} tickers"
        )));
    }
    let (start, end) = resolve_range(query.start_date.as_ref(), query.end_date.as_ref(), None)?;

    let key = format!("compare:{}:{start}:{end}", tickers.join(","));
    let bypass = no_cache_requested(&headers);
    if let Some(hit) = state.cache.get(&key, bypass) {
        return Ok(Json(hit));
    }

    let mut series = HashMap::new();
    for ticker in &tickers {
        lookup_ticker(&state, ticker)?;
        series.insert(ticker.clone(), state.store.bars(ticker, start, end)?);
    }
    let result = compare_series(&series)
        .ok_or_else(|| ApiError::validation("not enough overlapping trading days to compare"))?;

    let value = serde_json::to_value(&result).map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut tags: Vec<String> = tickers.iter().map(|t| ticker_tag(t)).collect();
    tags.push(kind_tag("compare"));
    state.cache.set(&key, value.clone(), CacheTtl::Normal, &tags);
    Ok(Json(value))
}

fn prompt_section(state: &AppState, ticker: &str) -> Result<String, ApiError> {
    let info = lookup_ticker(state, ticker)?;
    let today = today_kst();
    let bars = state.store.bars(ticker, today - Duration::days(90), today)?;
    let metrics = compute_metrics(&bars, 0.0);
    let flows = state
        .store
        .trading_flows(ticker, today - Duration::days(30), today)?;
    let news = state.store.recent_news(ticker, 10)?;
    Ok(prompt::build_prompt(&info, metrics.as_ref(), &flows, &news))
}

pub async fn ai_prompt(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let text = prompt_section(&state, &ticker)?;
    Ok(Json(json!({ "ticker": ticker, "prompt": text })))
}

#[derive(Debug, Deserialize)]
pub struct MultiPromptRequest {
    pub tickers: Vec<String>,
}

pub async fn ai_prompt_multi(
    State(state): State<AppState>,
    Json(request): Json<MultiPromptRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.tickers.is_empty() || request.tickers.len() > MAX_COMPARE_TICKERS {
        return Err(ApiError::validation(format!(
            "tickers must contain between 1 and {MAX_COMPARE_TICKERS} entries"
        )));
    }
    let mut sections = Vec::with_capacity(request.tickers.len());
    for ticker in &request.tickers {
        sections.push(prompt_section(&state, ticker)?);
    }
    Ok(Json(json!({
        "tickers": request.tickers,
        "prompt": prompt::build_multi_prompt(&sections),
    })))
}

pub async fn fundamentals(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let info = lookup_ticker(&state, &ticker)?;
    match info.asset_type {
        AssetType::Stock => {
            let latest = state.store.latest_stock_fundamentals(&ticker)?;
            Ok(Json(json!({ "type": "STOCK", "fundamentals": latest })))
        }
        AssetType::Etf => {
            let latest = state.store.latest_etf_fundamentals(&ticker)?;
            let holdings = state.store.latest_etf_holdings(&ticker)?;
            Ok(Json(
                json!({ "type": "ETF", "fundamentals": latest, "holdings": holdings }),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CollectQuery {
    pub days: Option<u32>,
}

pub async fn collect_one(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<CollectQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    lookup_ticker(&state, &ticker)?;
    let days = validate_days(
        query.days.unwrap_or(state.config.default_collect_days),
        MAX_COLLECT_DAYS,
    )?;
    let (prices, flows) = state.collector.collect_ticker(&ticker, days).await?;
    Ok(Json(json!({
        "ticker": ticker,
        "price_records": prices,
        "flow_records": flows,
    })))
}

pub async fn collect_trading_flow(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<CollectQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    lookup_ticker(&state, &ticker)?;
    let days = validate_days(
        query.days.unwrap_or(state.config.default_collect_days),
        MAX_COLLECT_DAYS,
    )?;
    let flows = state.collector.collect_trading_flows(&ticker, days).await?;
    Ok(Json(json!({ "ticker": ticker, "flow_records": flows })))
}

#[derive(Debug, Deserialize)]
pub struct IntradayCollectQuery {
    pub pages: Option<u32>,
}

pub async fn collect_intraday(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<IntradayCollectQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    lookup_ticker(&state, &ticker)?;
    let pages = query.pages.unwrap_or(10);
    if pages == 0 || pages > MAX_INTRADAY_PAGES {
        return Err(ApiError::validation(format!(
            "pages must be between 1 and {MAX_INTRADAY_PAGES}"
        )));
    }
    let written = state.collector.collect_intraday(&ticker, pages).await?;
    Ok(Json(json!({ "ticker": ticker, "tick_records": written })))
}

pub async fn collect_fundamentals(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    lookup_ticker(&state, &ticker)?;
    state.collector.collect_fundamentals(&ticker).await?;
    Ok(Json(json!({ "ticker": ticker, "collected": true })))
}

#[derive(Debug, Deserialize)]
pub struct BatchSummaryRequest {
    pub tickers: Vec<String>,
    pub price_days: Option<i64>,
    pub news_limit: Option<usize>,
}

/// Dashboard cards: latest bar, window return, latest flow and headlines
/// per requested ticker.
pub async fn batch_summary(
    State(state): State<AppState>,
    Json(request): Json<BatchSummaryRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.tickers.is_empty() {
        return Err(ApiError::validation("tickers must not be empty"));
    }
    let price_days = request.price_days.unwrap_or(30).max(1);
    let news_limit = request.news_limit.unwrap_or(3).min(10);
    let today = today_kst();

    let mut cards = Vec::with_capacity(request.tickers.len());
    for ticker in &request.tickers {
        let info = match state.store.get_ticker(ticker)? {
            Some(info) => info,
            None => continue,
        };
        let bars = state
            .store
            .bars(ticker, today - Duration::days(price_days), today)?;
        let period_return = match (bars.first(), bars.last()) {
            (Some(first), Some(last)) if first.close != 0.0 => {
                Some((last.close / first.close - 1.0) * 100.0)
            }
            _ => None,
        };
        cards.push(json!({
            "ticker": info.ticker,
            "name": info.name,
            "type": info.asset_type,
            "latest_bar": bars.last(),
            "period_return": period_return,
            "latest_flow": state.store.latest_trading_flow(ticker)?,
            "news": state.store.recent_news(ticker, news_limit)?,
        }));
    }
    Ok(Json(json!({ "cards": cards })))
}
