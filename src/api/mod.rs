//! HTTP facade: request validation, dispatch into the components, and the
//! error mapping defined by the error table. Handlers stay thin; domain
//! logic lives in the components they call.

mod alerts;
mod auth;
mod data;
mod etfs;
mod news;
mod scanner;
mod settings;
mod simulation;

pub use auth::require_api_key;

use crate::cache::Cache;
use crate::collector::Collector;
use crate::config::Config;
use crate::error::ApiError;
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::upstream::UpstreamApi;
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application context owned by `main` and shared with every handler.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<Store>,
    pub cache: Arc<Cache>,
    pub collector: Arc<Collector>,
    pub upstream: Arc<dyn UpstreamApi>,
    pub scheduler: Arc<Scheduler>,
}

pub type AppState = Arc<AppContext>;

/// `X-No-Cache: true` flushes the entry before handling.
pub fn no_cache_requested(headers: &HeaderMap) -> bool {
    headers
        .get("X-No-Cache")
        .and_then(|v| v.to_str().ok())
        .map(|v| matches!(v, "1" | "true" | "TRUE"))
        .unwrap_or(false)
}

pub(crate) fn parse_date(s: &str, field: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ApiError::validation(format!("{field} must be YYYY-MM-DD")))
}

pub(crate) fn parse_date_opt(s: Option<&String>, field: &str) -> Result<Option<NaiveDate>, ApiError> {
    s.map(|v| parse_date(v, field)).transpose()
}

/// Positive day-count validation shared by the collect endpoints.
pub(crate) fn validate_days(days: u32, max: u32) -> Result<u32, ApiError> {
    if days == 0 {
        return Err(ApiError::validation("days must be positive"));
    }
    if days > max {
        return Err(ApiError::validation(format!("days must be at most {max}")));
    }
    Ok(days)
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .store
        .ping()
        .map_err(|e| ApiError::Store(e.to_string()))?;
    Ok(Json(json!({
        "status": "ok",
        "store": "reachable",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Full `/api` router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/etfs", get(etfs::list_etfs))
        .route("/etfs/compare", get(etfs::compare))
        .route("/etfs/ai-prompt-multi", post(etfs::ai_prompt_multi))
        .route("/etfs/batch-summary", post(etfs::batch_summary))
        .route("/etfs/:ticker", get(etfs::etf_detail))
        .route("/etfs/:ticker/prices", get(etfs::prices))
        .route("/etfs/:ticker/trading-flow", get(etfs::trading_flow))
        .route("/etfs/:ticker/metrics", get(etfs::metrics))
        .route("/etfs/:ticker/insights", get(etfs::insights))
        .route("/etfs/:ticker/intraday", get(etfs::intraday))
        .route("/etfs/:ticker/ai-prompt", get(etfs::ai_prompt))
        .route("/etfs/:ticker/fundamentals", get(etfs::fundamentals))
        .route("/etfs/:ticker/collect", post(etfs::collect_one))
        .route(
            "/etfs/:ticker/collect-trading-flow",
            post(etfs::collect_trading_flow),
        )
        .route("/etfs/:ticker/collect-intraday", post(etfs::collect_intraday))
        .route(
            "/etfs/:ticker/collect-fundamentals",
            post(etfs::collect_fundamentals),
        )
        .route("/news/:ticker", get(news::news_for_ticker))
        .route("/news/:ticker/collect", post(news::collect_news))
        .route("/data/collect-all", post(data::collect_all))
        .route("/data/backfill", post(data::backfill))
        .route("/data/status", get(data::collection_status))
        .route("/data/scheduler-status", get(data::scheduler_status))
        .route("/data/stats", get(data::stats))
        .route("/data/cache/stats", get(data::cache_stats))
        .route("/data/cache/clear", delete(data::cache_clear))
        .route("/data/reset", delete(data::reset))
        .route("/data/collect-fundamentals", post(data::collect_fundamentals))
        .route("/data/collect-progress", get(data::collect_progress))
        .route(
            "/settings/stocks",
            get(settings::list_stocks).post(settings::add_stock),
        )
        .route("/settings/stocks/search", get(settings::search_stocks))
        .route("/settings/stocks/reorder", post(settings::reorder_stocks))
        .route(
            "/settings/stocks/:ticker",
            put(settings::update_stock).delete(settings::delete_stock),
        )
        .route(
            "/settings/stocks/:ticker/validate",
            get(settings::validate_stock),
        )
        .route(
            "/settings/ticker-catalog/collect",
            post(settings::collect_catalog),
        )
        .route(
            "/settings/ticker-catalog/collect-progress",
            get(settings::catalog_progress),
        )
        .route(
            "/settings/api-keys",
            get(settings::get_api_keys).put(settings::put_api_keys),
        )
        .route("/alerts/", post(alerts::create_rule))
        .route("/alerts/trigger", post(alerts::trigger))
        .route("/alerts/history/:ticker", get(alerts::history))
        // GET takes a ticker; PUT/DELETE take a rule id.
        .route(
            "/alerts/:key",
            get(alerts::rules_for_ticker)
                .put(alerts::update_rule)
                .delete(alerts::delete_rule),
        )
        .route("/scanner", get(scanner::scan))
        .route("/scanner/themes", get(scanner::themes))
        .route("/scanner/recommendations", get(scanner::recommendations))
        .route("/scanner/collect-progress", get(scanner::collect_progress))
        .route("/scanner/collect-data", post(scanner::collect_data))
        .route("/scanner/cancel-collect", post(scanner::cancel_collect))
        .route("/simulation/lump-sum", post(simulation::lump_sum))
        .route("/simulation/dca", post(simulation::dca))
        .route("/simulation/portfolio", post(simulation::portfolio));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
