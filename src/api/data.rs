//! Batch data management: collect-all, backfill, status, stats, cache and
//! reset endpoints.

use super::{require_api_key, validate_days, AppState};
use crate::collector::JobKind;
use crate::error::ApiError;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

const MAX_COLLECT_DAYS: u32 = 365;
/// Backfill may reach the five-year simulation horizon.
const MAX_BACKFILL_DAYS: u32 = 1825;

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

pub async fn collect_all(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    let days = validate_days(
        query.days.unwrap_or(state.config.default_collect_days),
        MAX_COLLECT_DAYS,
    )?;
    let report = state.collector.collect_all(days).await?;
    Ok(Json(serde_json::to_value(&report).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn backfill(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    let days = validate_days(query.days.unwrap_or(365), MAX_BACKFILL_DAYS)?;
    let report = state.collector.backfill(days).await?;
    Ok(Json(serde_json::to_value(&report).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn collection_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let states = state.store.all_collection_states()?;
    Ok(Json(json!({
        "is_collecting": state.collector.is_collecting(),
        "tickers": states,
    })))
}

pub async fn scheduler_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let status = state.scheduler.status();
    Ok(Json(serde_json::to_value(&status).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state.store.stats()?;
    Ok(Json(serde_json::to_value(&stats).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn cache_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(
        serde_json::to_value(state.cache.stats()).map_err(|e| ApiError::Internal(e.to_string()))?,
    ))
}

pub async fn cache_clear(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    let purged = state.cache.clear();
    Ok(Json(json!({ "purged_entries": purged })))
}

pub async fn reset(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    let deleted = state.store.reset_market_data()?;
    state.cache.clear();
    Ok(Json(json!({ "deleted_rows": deleted })))
}

pub async fn collect_fundamentals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    let report = state.collector.collect_fundamentals_all().await?;
    Ok(Json(serde_json::to_value(&report).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn collect_progress(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let progress = state.collector.progress.snapshot(JobKind::CollectAll);
    Ok(Json(serde_json::to_value(&progress).map_err(|e| ApiError::Internal(e.to_string()))?))
}
