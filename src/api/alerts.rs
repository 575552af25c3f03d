//! Alert rule CRUD, trigger recording and history reads.

use super::{require_api_key, AppState};
use crate::alerts::{record_trigger, validate_rule};
use crate::error::ApiError;
use crate::models::{AlertDirection, AlertType};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

const MAX_HISTORY_LIMIT: usize = 200;

fn parse_alert_type(raw: &str) -> Result<AlertType, ApiError> {
    AlertType::parse(raw).ok_or_else(|| {
        ApiError::validation("alert_type must be one of buy, sell, price_change, trading_signal")
    })
}

fn parse_direction(raw: &str) -> Result<AlertDirection, ApiError> {
    AlertDirection::parse(raw)
        .ok_or_else(|| ApiError::validation("direction must be one of above, below, both"))
}

#[derive(Debug, Deserialize)]
pub struct RulesQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn rules_for_ticker(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<RulesQuery>,
) -> Result<Json<Value>, ApiError> {
    let rules = state.store.alert_rules(&ticker, query.active_only)?;
    Ok(Json(serde_json::to_value(&rules).map_err(|e| ApiError::Internal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub ticker: String,
    pub alert_type: String,
    pub direction: String,
    pub target_price: f64,
    #[serde(default)]
    pub memo: String,
}

pub async fn create_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_api_key(&state, &headers)?;
    let alert_type = parse_alert_type(&request.alert_type)?;
    let direction = parse_direction(&request.direction)?;
    validate_rule(alert_type, direction, request.target_price).map_err(ApiError::Validation)?;
    state
        .store
        .get_ticker(&request.ticker)?
        .ok_or_else(|| ApiError::not_found(format!("ticker {}", request.ticker)))?;

    let rule = state.store.create_alert_rule(
        &request.ticker,
        alert_type,
        direction,
        request.target_price,
        &request.memo,
        Utc::now(),
    )?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&rule).map_err(|e| ApiError::Internal(e.to_string()))?),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub alert_type: Option<String>,
    pub direction: Option<String>,
    pub target_price: Option<f64>,
    pub memo: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateRuleRequest>,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    let id: i64 = rule_id
        .parse()
        .map_err(|_| ApiError::validation("rule_id must be an integer"))?;
    let mut rule = state
        .store
        .get_alert_rule(id)?
        .ok_or_else(|| ApiError::not_found(format!("alert rule {id}")))?;

    if let Some(raw) = &request.alert_type {
        rule.alert_type = parse_alert_type(raw)?;
    }
    if let Some(raw) = &request.direction {
        rule.direction = parse_direction(raw)?;
    }
    if let Some(target) = request.target_price {
        rule.target_price = target;
    }
    if let Some(memo) = request.memo {
        rule.memo = memo;
    }
    if let Some(active) = request.is_active {
        rule.is_active = active;
    }
    validate_rule(rule.alert_type, rule.direction, rule.target_price)
        .map_err(ApiError::Validation)?;

    state.store.update_alert_rule(&rule)?;
    Ok(Json(serde_json::to_value(&rule).map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    let id: i64 = rule_id
        .parse()
        .map_err(|_| ApiError::validation("rule_id must be an integer"))?;
    if !state.store.delete_alert_rule(id)? {
        return Err(ApiError::not_found(format!("alert rule {id}")));
    }
    Ok(Json(json!({ "rule_id": id, "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub rule_id: i64,
    pub ticker: String,
    pub alert_type: String,
    pub message: String,
}

/// Record a trigger delivered by the client. At-least-once delivery means
/// duplicates arrive; they are appended and flagged.
pub async fn trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    let alert_type = parse_alert_type(&request.alert_type)?;
    state
        .store
        .get_alert_rule(request.rule_id)?
        .ok_or_else(|| ApiError::not_found(format!("alert rule {}", request.rule_id)))?;

    let outcome = record_trigger(
        &state.store,
        request.rule_id,
        &request.ticker,
        alert_type,
        &request.message,
        Utc::now(),
    )?;
    Ok(Json(serde_json::to_value(&outcome).map_err(|e| ApiError::Internal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn history(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(50).min(MAX_HISTORY_LIMIT);
    let entries = state.store.alert_history(&ticker, limit)?;
    Ok(Json(serde_json::to_value(&entries).map_err(|e| ApiError::Internal(e.to_string()))?))
}
