//! Watchlist management, catalog autocomplete/refresh and stored API keys.

use super::{parse_date_opt, require_api_key, AppState};
use crate::cache::kind_tag;
use crate::collector::JobKind;
use crate::error::ApiError;
use crate::models::{AssetType, TickerInfo};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const MAX_TICKER_LEN: usize = 10;
const SEARCH_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct StockRequest {
    pub ticker: String,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    #[serde(default)]
    pub theme: String,
    pub launch_date: Option<String>,
    pub expense_ratio: Option<f64>,
    pub purchase_date: Option<String>,
    pub purchase_price: Option<f64>,
    pub quantity: Option<f64>,
    pub search_keyword: Option<String>,
    #[serde(default)]
    pub relevance_keywords: Vec<String>,
}

impl StockRequest {
    fn into_info(self) -> Result<TickerInfo, ApiError> {
        let ticker = self.ticker.trim().to_string();
        if ticker.is_empty() || ticker.len() > MAX_TICKER_LEN {
            return Err(ApiError::validation(format!(
                "ticker must be 1..={MAX_TICKER_LEN} characters"
            )));
        }
        if !ticker.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ApiError::validation("ticker must be alphanumeric"));
        }
        if self.name.trim().is_empty() {
            return Err(ApiError::validation("name must not be empty"));
        }
        let asset_type = AssetType::parse(&self.asset_type)
            .ok_or_else(|| ApiError::validation("type must be ETF or STOCK"))?;
        Ok(TickerInfo {
            ticker,
            name: self.name.trim().to_string(),
            asset_type,
            theme: self.theme,
            launch_date: parse_date_opt(self.launch_date.as_ref(), "launch_date")?,
            expense_ratio: self.expense_ratio,
            purchase_date: parse_date_opt(self.purchase_date.as_ref(), "purchase_date")?,
            purchase_price: self.purchase_price,
            quantity: self.quantity,
            search_keyword: self.search_keyword,
            relevance_keywords: self.relevance_keywords,
            display_order: 0,
        })
    }
}

pub async fn list_stocks(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tickers = state.store.list_tickers()?;
    Ok(Json(serde_json::to_value(&tickers).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn add_stock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StockRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_api_key(&state, &headers)?;
    let info = request.into_info()?;
    if !state.store.add_ticker(&info)? {
        return Err(ApiError::validation(format!(
            "ticker {} is already registered",
            info.ticker
        )));
    }
    state.cache.invalidate_tag(&kind_tag("watchlist"));
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&info).map_err(|e| ApiError::Internal(e.to_string()))?),
    ))
}

pub async fn update_stock(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    headers: HeaderMap,
    Json(mut request): Json<StockRequest>,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    request.ticker = ticker.clone();
    let info = request.into_info()?;
    if !state.store.update_ticker(&info)? {
        return Err(ApiError::not_found(format!("ticker {ticker}")));
    }
    state.cache.invalidate_tag(&kind_tag("watchlist"));
    Ok(Json(serde_json::to_value(&info).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn delete_stock(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    if !state.store.delete_ticker(&ticker)? {
        return Err(ApiError::not_found(format!("ticker {ticker}")));
    }
    state.cache.invalidate_tag(&kind_tag("watchlist"));
    state.cache.invalidate_tag(&crate::cache::ticker_tag(&ticker));
    Ok(Json(json!({ "ticker": ticker, "deleted": true })))
}

pub async fn validate_stock(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let validation = state.upstream.validate_ticker(&ticker).await?;
    Ok(Json(serde_json::to_value(&validation).map_err(|e| ApiError::Internal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
}

pub async fn search_stocks(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(ApiError::validation("q must not be empty"));
    }
    let asset_type = match query.asset_type.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            AssetType::parse(raw).ok_or_else(|| ApiError::validation("type must be ETF or STOCK"))?,
        ),
    };
    let hits = state.store.search_catalog(q, asset_type, SEARCH_LIMIT)?;
    Ok(Json(serde_json::to_value(&hits).map_err(|e| ApiError::Internal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub tickers: Vec<String>,
}

pub async fn reorder_stocks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    if request.tickers.is_empty() {
        return Err(ApiError::validation("tickers must not be empty"));
    }
    state.store.reorder_tickers(&request.tickers)?;
    state.cache.invalidate_tag(&kind_tag("watchlist"));
    let tickers = state.store.list_tickers()?;
    Ok(Json(serde_json::to_value(&tickers).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn collect_catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    state.collector.spawn_catalog_collect()?;
    Ok(Json(json!({ "started": true })))
}

pub async fn catalog_progress(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let progress = state.collector.progress.snapshot(JobKind::CatalogCollect);
    Ok(Json(serde_json::to_value(&progress).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn get_api_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    // Values are masked; only which services are configured is exposed.
    let keys = state.store.api_keys()?;
    let masked: BTreeMap<String, String> = keys
        .into_iter()
        .map(|(service, value)| {
            let tail: String = value.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            (service, format!("****{tail}"))
        })
        .collect();
    Ok(Json(serde_json::to_value(&masked).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn put_api_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(keys): Json<BTreeMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    state.store.set_api_keys(&keys)?;
    Ok(Json(json!({ "updated": keys.len() })))
}
