//! News endpoints: range reads with optional aggregate analysis, plus
//! on-demand collection.

use super::{parse_date_opt, require_api_key, validate_days, AppState};
use crate::error::ApiError;
use crate::models::{today_kst, NewsItem, Sentiment};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const NEWS_READ_LIMIT: usize = 200;
const MAX_NEWS_DAYS: u32 = 30;

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub analyze: bool,
}

/// Counts by sentiment, tag frequency and average relevance.
fn analyze_news(items: &[NewsItem]) -> Value {
    let mut by_sentiment: BTreeMap<&str, usize> = BTreeMap::new();
    let mut tag_counts: BTreeMap<String, usize> = BTreeMap::new();
    for item in items {
        let key = item.sentiment.map(|s| Sentiment::as_str(&s)).unwrap_or("unscored");
        *by_sentiment.entry(key).or_default() += 1;
        for tag in &item.tags {
            *tag_counts.entry(tag.clone()).or_default() += 1;
        }
    }
    let mut top_tags: Vec<(String, usize)> = tag_counts.into_iter().collect();
    top_tags.sort_by(|a, b| b.1.cmp(&a.1));
    top_tags.truncate(5);

    let avg_relevance = if items.is_empty() {
        0.0
    } else {
        items.iter().map(|i| i.relevance_score).sum::<f64>() / items.len() as f64
    };

    json!({
        "count": items.len(),
        "by_sentiment": by_sentiment,
        "top_tags": top_tags,
        "avg_relevance": avg_relevance,
    })
}

pub async fn news_for_ticker(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<NewsQuery>,
) -> Result<Json<Value>, ApiError> {
    let end = parse_date_opt(query.end_date.as_ref(), "end_date")?.unwrap_or_else(today_kst);
    let start = parse_date_opt(query.start_date.as_ref(), "start_date")?
        .unwrap_or(end - Duration::days(7));
    if end < start {
        return Err(ApiError::validation("end_date must not precede start_date"));
    }

    let items = state.store.news(&ticker, start, end, NEWS_READ_LIMIT)?;
    if query.analyze {
        let analysis = analyze_news(&items);
        Ok(Json(json!({ "items": items, "analysis": analysis })))
    } else {
        Ok(Json(json!({ "items": items })))
    }
}

#[derive(Debug, Deserialize)]
pub struct NewsCollectQuery {
    pub days: Option<u32>,
}

pub async fn collect_news(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<NewsCollectQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;
    state
        .store
        .get_ticker(&ticker)?
        .ok_or_else(|| ApiError::not_found(format!("ticker {ticker}")))?;
    let days = validate_days(query.days.unwrap_or(7), MAX_NEWS_DAYS)?;
    let written = state.collector.collect_news(&ticker, days).await?;
    Ok(Json(json!({ "ticker": ticker, "news_records": written })))
}
