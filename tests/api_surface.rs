//! Boundary validation and facade behavior across the REST surface.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Duration;
use common::*;
use etfwatch_backend::models::today_kst;
use serde_json::json;
use std::sync::Arc;

fn app() -> TestApp {
    test_app(Arc::new(ScriptedUpstream::new()))
}

#[tokio::test]
async fn zero_days_collect_is_rejected() {
    let app = app();
    register_etf(&app, "487240", "x");
    let (status, body) = send(&app.router, post_empty("/api/data/collect-all?days=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("days"));

    let (status, _) = send(&app.router, post_empty("/api/etfs/487240/collect?days=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn compare_ticker_count_bounds() {
    let app = app();
    let (status, _) = send(&app.router, get("/api/etfs/compare?tickers=487240")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let many: Vec<String> = (0..21).map(|i| format!("{:06}", 100000 + i)).collect();
    let uri = format!("/api/etfs/compare?tickers={}", many.join(","));
    let (status, _) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dca_buy_day_boundary() {
    let app = app();
    register_etf(&app, "487240", "x");
    seed_store_bars(
        &app,
        "487240",
        &[(chrono::NaiveDate::from_ymd_opt(2025, 1, 28).unwrap(), 10000.0)],
    );

    let request = |buy_day: u32| {
        post_json(
            "/api/simulation/dca",
            json!({
                "ticker": "487240",
                "monthly_amount": 100000.0,
                "start_date": "2025-01-01",
                "end_date": "2025-01-31",
                "buy_day": buy_day
            }),
        )
    };

    let (status, _) = send(&app.router, request(29)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, request(28)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reversed_date_range_is_rejected() {
    let app = app();
    register_etf(&app, "487240", "x");
    let (status, _) = send(
        &app.router,
        get("/api/etfs/487240/prices?start_date=2026-07-10&end_date=2026-07-01"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/simulation/lump-sum",
            json!({"ticker": "487240", "buy_date": "2099-01-01", "amount": 1000.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn portfolio_validation_matrix() {
    let app = app();
    register_etf(&app, "487240", "x");

    let base = |holdings: serde_json::Value| {
        post_json(
            "/api/simulation/portfolio",
            json!({
                "holdings": holdings,
                "amount": 1000000.0,
                "start_date": "2025-01-01",
                "end_date": "2025-06-30"
            }),
        )
    };

    // 21 holdings
    let many: Vec<_> = (0..21)
        .map(|i| json!({"ticker": format!("{:06}", 100000 + i), "weight": 1.0 / 21.0}))
        .collect();
    let (status, _) = send(&app.router, base(json!(many))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // duplicates
    let dup = json!([
        {"ticker": "487240", "weight": 0.5},
        {"ticker": "487240", "weight": 0.5}
    ]);
    let (status, body) = send(&app.router, base(dup)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("duplicate"));

    // weight sum off by more than the tolerance
    let off = json!([
        {"ticker": "487240", "weight": 0.6},
        {"ticker": "111111", "weight": 0.5}
    ]);
    let (status, body) = send(&app.router, base(off)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("weights"));
}

#[tokio::test]
async fn unknown_ticker_is_404() {
    let app = app();
    let (status, _) = send(&app.router, get("/api/etfs/999999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, get("/api/etfs/999999/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_key_guards_write_paths_when_configured() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let mut app = test_app(Arc::clone(&upstream));
    // Rebuild the app with a configured key.
    let mut config = etfwatch_backend::config::Config::default();
    config.api_key = Some("sekrit".into());
    let state = Arc::new(etfwatch_backend::api::AppContext {
        config,
        store: Arc::clone(&app.state.store),
        cache: Arc::clone(&app.state.cache),
        collector: Arc::clone(&app.state.collector),
        upstream: Arc::clone(&app.state.upstream),
        scheduler: Arc::clone(&app.state.scheduler),
    });
    app.router = etfwatch_backend::api::build_router(state);

    let (status, _) = send(&app.router, post_empty("/api/data/collect-all?days=5")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/data/collect-all?days=5")
        .header("X-API-Key", "sekrit")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    // Reads stay open.
    let (status, _) = send(&app.router, get("/api/etfs")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reset_preserves_watchlist_and_alerts() {
    let app = app();
    register_etf(&app, "487240", "x");
    let today = today_kst();
    seed_store_bars(&app, "487240", &[(today - Duration::days(1), 100.0), (today, 101.0)]);
    let (status, _) = send(
        &app.router,
        post_json(
            "/api/alerts/",
            json!({"ticker": "487240", "alert_type": "sell", "direction": "above", "target_price": 120.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/data/reset")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["deleted_rows"].as_i64().unwrap() >= 2);

    let (_, etfs) = send(&app.router, get("/api/etfs")).await;
    assert_eq!(etfs.as_array().unwrap().len(), 1);
    let (_, rules) = send(&app.router, get("/api/alerts/487240")).await;
    assert_eq!(rules.as_array().unwrap().len(), 1);
    let (_, prices) = send(&app.router, get("/api/etfs/487240/prices")).await;
    assert_eq!(prices.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn scanner_validates_paging_and_sort() {
    let app = app();
    let (status, _) = send(&app.router, get("/api/scanner?page_size=51")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, get("/api/scanner?page=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, get("/api/scanner?sort_by=garbage")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app.router, get("/api/scanner?page=1&page_size=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn watchlist_crud_round_trip() {
    let app = app();

    let (status, created) = send(
        &app.router,
        post_json(
            "/api/settings/stocks",
            json!({"ticker": "487240", "name": "KODEX AI전력핵심설비", "type": "ETF", "theme": "AI 전력"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["ticker"], "487240");

    // Duplicate registration fails.
    let (status, _) = send(
        &app.router,
        post_json(
            "/api/settings/stocks",
            json!({"ticker": "487240", "name": "dup", "type": "ETF"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Delete cascades market data, keeps catalog/alert history.
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/settings/stocks/487240")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, etfs) = send(&app.router, get("/api/etfs")).await;
    assert_eq!(etfs.as_array().map(|a| a.len()).unwrap_or(0), 0);
}

#[tokio::test]
async fn health_reports_store_reachable() {
    let app = app();
    let (status, body) = send(&app.router, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn intraday_empty_result_is_not_cached() {
    let app = app();
    register_etf(&app, "487240", "x");

    let (status, body) = send(&app.router, get("/api/etfs/487240/intraday")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);

    // Nothing was cached for the empty read.
    let stats = app.state.cache.stats();
    assert_eq!(stats.sets, 0);
}
