//! Simulation endpoints: lump-sum, DCA and portfolio.

use super::{parse_date, AppState};
use crate::analytics::simulate::{
    run_dca, run_lump_sum, run_portfolio, PortfolioHolding, MAX_PORTFOLIO_HOLDINGS,
    MAX_SIMULATION_DAYS, WEIGHT_SUM_TOLERANCE,
};
use crate::error::ApiError;
use crate::models::today_kst;
use axum::{extract::State, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

fn check_span(start: NaiveDate, end: NaiveDate) -> Result<(), ApiError> {
    if end < start {
        return Err(ApiError::validation("end_date must not precede start_date"));
    }
    if (end - start).num_days() > MAX_SIMULATION_DAYS {
        return Err(ApiError::validation("simulation horizon is capped at 5 years"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct LumpSumRequest {
    pub ticker: String,
    pub buy_date: String,
    pub amount: f64,
}

pub async fn lump_sum(
    State(state): State<AppState>,
    Json(request): Json<LumpSumRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.amount <= 0.0 {
        return Err(ApiError::validation("amount must be positive"));
    }
    let buy_date = parse_date(&request.buy_date, "buy_date")?;
    if buy_date > today_kst() {
        return Err(ApiError::validation("buy_date must not be in the future"));
    }
    state
        .store
        .get_ticker(&request.ticker)?
        .ok_or_else(|| ApiError::not_found(format!("ticker {}", request.ticker)))?;

    let bars = state.store.bars(&request.ticker, buy_date, today_kst())?;
    let result = run_lump_sum(&bars, buy_date, request.amount)
        .ok_or_else(|| ApiError::validation("no trading data on or after buy_date"))?;
    Ok(Json(serde_json::to_value(&result).map_err(|e| ApiError::Internal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
pub struct DcaRequest {
    pub ticker: String,
    pub monthly_amount: f64,
    pub start_date: String,
    pub end_date: String,
    pub buy_day: u32,
}

pub async fn dca(
    State(state): State<AppState>,
    Json(request): Json<DcaRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.monthly_amount <= 0.0 {
        return Err(ApiError::validation("monthly_amount must be positive"));
    }
    if !(1..=28).contains(&request.buy_day) {
        return Err(ApiError::validation("buy_day must be between 1 and 28"));
    }
    let start = parse_date(&request.start_date, "start_date")?;
    let end = parse_date(&request.end_date, "end_date")?;
    check_span(start, end)?;
    state
        .store
        .get_ticker(&request.ticker)?
        .ok_or_else(|| ApiError::not_found(format!("ticker {}", request.ticker)))?;

    let bars = state.store.bars(&request.ticker, start, end)?;
    let result = run_dca(&bars, request.monthly_amount, start, end, request.buy_day)
        .ok_or_else(|| ApiError::validation("no tradable days in the requested range"))?;
    Ok(Json(serde_json::to_value(&result).map_err(|e| ApiError::Internal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
pub struct PortfolioRequest {
    pub holdings: Vec<PortfolioHolding>,
    pub amount: f64,
    pub start_date: String,
    pub end_date: String,
}

pub async fn portfolio(
    State(state): State<AppState>,
    Json(request): Json<PortfolioRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.amount <= 0.0 {
        return Err(ApiError::validation("amount must be positive"));
    }
    if request.holdings.is_empty() || request.holdings.len() > MAX_PORTFOLIO_HOLDINGS {
        return Err(ApiError::validation(format!(
            "holdings must contain between 1 and {MAX_PORTFOLIO_HOLDINGS} entries"
        )));
    }
    let mut seen = HashSet::new();
    for holding in &request.holdings {
        if !seen.insert(holding.ticker.clone()) {
            return Err(ApiError::validation(format!(
                "duplicate holding {}",
                holding.ticker
            )));
        }
        if holding.weight <= 0.0 {
            return Err(ApiError::validation("holding weights must be positive"));
        }
    }
    let weight_sum: f64 = request.holdings.iter().map(|h| h.weight).sum();
    if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ApiError::validation(format!(
            "weights must sum to 1.0 (got {weight_sum})"
        )));
    }
    let start = parse_date(&request.start_date, "start_date")?;
    let end = parse_date(&request.end_date, "end_date")?;
    check_span(start, end)?;

    let mut series = HashMap::new();
    for holding in &request.holdings {
        state
            .store
            .get_ticker(&holding.ticker)?
            .ok_or_else(|| ApiError::not_found(format!("ticker {}", holding.ticker)))?;
        series.insert(
            holding.ticker.clone(),
            state.store.bars(&holding.ticker, start, end)?,
        );
    }

    let result = run_portfolio(&series, &request.holdings, request.amount, start, end)
        .ok_or_else(|| ApiError::validation("one or more holdings have no tradable days"))?;
    Ok(Json(serde_json::to_value(&result).map_err(|e| ApiError::Internal(e.to_string()))?))
}
