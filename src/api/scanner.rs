//! Screener endpoints over catalog snapshot columns.

use super::{no_cache_requested, require_api_key, AppState};
use crate::cache::{kind_tag, CacheTtl};
use crate::collector::{JobKind, Progress};
use crate::error::ApiError;
use crate::models::AssetType;
use crate::screener::{self, ScreenerQuery, SortDir, SortKey, MAX_PAGE_SIZE};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct ScanParams {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
    pub sector: Option<String>,
    pub min_weekly_return: Option<f64>,
    pub max_weekly_return: Option<f64>,
    #[serde(default)]
    pub foreign_net_positive: bool,
    #[serde(default)]
    pub institutional_net_positive: bool,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl ScanParams {
    fn into_query(self) -> Result<ScreenerQuery, ApiError> {
        let asset_type = match self.asset_type.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                AssetType::parse(raw)
                    .ok_or_else(|| ApiError::validation("type must be ETF or STOCK"))?,
            ),
        };
        let sort_by = match self.sort_by.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(SortKey::parse(raw).ok_or_else(|| {
                ApiError::validation(
                    "sort_by must be one of weekly_return, daily_change_pct, volume, \
                     close_price, foreign_net, institutional_net, name",
                )
            })?),
        };
        let sort_dir = match self.sort_dir.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                SortDir::parse(raw)
                    .ok_or_else(|| ApiError::validation("sort_dir must be asc or desc"))?,
            ),
        };
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(ApiError::validation("page is 1-based"));
        }
        let page_size = self.page_size.unwrap_or(20);
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ApiError::validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(ScreenerQuery {
            query: self.q,
            asset_type,
            sector: self.sector,
            min_weekly_return: self.min_weekly_return,
            max_weekly_return: self.max_weekly_return,
            foreign_net_positive: self.foreign_net_positive,
            institutional_net_positive: self.institutional_net_positive,
            sort_by,
            sort_dir,
            page,
            page_size,
        })
    }
}

pub async fn scan(
    State(state): State<AppState>,
    Query(params): Query<ScanParams>,
) -> Result<Json<Value>, ApiError> {
    let query = params.into_query()?;
    let entries = state.store.catalog_entries()?;
    let page = screener::screen(entries, &query);
    Ok(Json(serde_json::to_value(&page).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn themes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let bypass = no_cache_requested(&headers);
    if let Some(hit) = state.cache.get("scanner:themes", bypass) {
        return Ok(Json(hit));
    }
    let entries = state.store.catalog_entries()?;
    let groups = screener::themes(entries);
    let value = serde_json::to_value(&groups).map_err(|e| ApiError::Internal(e.to_string()))?;
    state
        .cache
        .set("scanner:themes", value.clone(), CacheTtl::Slow, &[kind_tag("screener")]);
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<usize>,
}

pub async fn recommendations(
    State(state): State<AppState>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(10).clamp(1, MAX_PAGE_SIZE);
    let entries = state.store.catalog_entries()?;
    let presets = screener::recommendations(&entries, limit);
    Ok(Json(serde_json::to_value(&presets).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn collect_progress(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let progress: Progress = state.collector.progress.snapshot(JobKind::ScreeningCollect);
    Ok(Json(serde_json::to_value(&progress).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn collect_data(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    state.collector.spawn_screening_collect()?;
    Ok(Json(json!({ "started": true })))
}

pub async fn cancel_collect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    let accepted = state
        .collector
        .progress
        .request_cancel(JobKind::ScreeningCollect);
    Ok(Json(json!({ "cancel_requested": accepted })))
}
