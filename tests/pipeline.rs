//! End-to-end pipeline scenarios driven through the REST facade with a
//! scripted upstream: smart-collection skip, gap healing, annualization
//! suppression, comparison normalization, DCA carry and trigger dedup.

mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::*;
use etfwatch_backend::models::today_kst;
use etfwatch_backend::store::CollectionDelta;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn smart_collection_skips_when_current() {
    let upstream = Arc::new(ScriptedUpstream::new());
    upstream.seed_bar_history("487240", 30, 10000.0, 10300.0);
    upstream.seed_flow_history("487240", 30);
    let app = test_app(Arc::clone(&upstream));
    register_etf(&app, "487240", "KODEX AI전력핵심설비");

    // First run fills the store and advances the watermark to today.
    let (status, body) = send(&app.router, post_empty("/api/data/collect-all?days=30")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], 1);
    assert_eq!(body["price_records"], 30);

    let state = app.state.store.collection_state("487240").unwrap().unwrap();
    assert_eq!(state.last_price_date, Some(today_kst()));
    assert_eq!(state.price_records_count, 30);

    // Second run is a no-op for that ticker.
    let (status, body) = send(&app.router, post_empty("/api/data/collect-all?days=30")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], 1);
    assert_eq!(body["price_records"], 0);
    assert_eq!(body["details"][0]["price_records"], 0);

    // The skip happened without an upstream fetch.
    assert_eq!(upstream.calls_matching("bars:487240").len(), 1);
}

#[tokio::test]
async fn gap_heal_fetches_exactly_the_missing_days() {
    let upstream = Arc::new(ScriptedUpstream::new());
    upstream.seed_bar_history("487240", 40, 10000.0, 10400.0);
    let app = test_app(Arc::clone(&upstream));
    register_etf(&app, "487240", "KODEX AI전력핵심설비");

    // Store already covers everything up to today-3.
    let today = today_kst();
    let seeded: Vec<_> = (3..13)
        .map(|i| (today - Duration::days(i), 10000.0 + i as f64))
        .collect();
    seed_store_bars(&app, "487240", &seeded);
    app.state
        .store
        .update_collection_state(
            "487240",
            &CollectionDelta {
                last_price_date: Some(today - Duration::days(3)),
                price_records_added: seeded.len() as i64,
                ..CollectionDelta::success(chrono::Utc::now())
            },
        )
        .unwrap();

    let (status, body) = send(&app.router, post_empty("/api/data/collect-all?days=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price_records"], 3);

    let state = app.state.store.collection_state("487240").unwrap().unwrap();
    assert_eq!(state.last_price_date, Some(today));

    // Never fetched more than the gap.
    assert_eq!(upstream.calls_matching("bars:487240"), vec!["bars:487240:3"]);
}

#[tokio::test]
async fn annualization_suppressed_below_90_trading_days() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let app = test_app(Arc::clone(&upstream));
    register_etf(&app, "487240", "KODEX AI전력핵심설비");

    let today = today_kst();
    let closes: Vec<_> = (0..60)
        .map(|i| {
            let close = 10000.0 + 709.0 * i as f64 / 59.0;
            (today - Duration::days(59 - i), close)
        })
        .collect();
    seed_store_bars(&app, "487240", &closes);

    let (status, body) = send(&app.router, get("/api/etfs/487240/metrics?period=3m")).await;
    assert_eq!(status, StatusCode::OK);
    assert!((body["period_return"].as_f64().unwrap() - 7.09).abs() < 0.01);
    assert!(body["annualized_return"].is_null());

    // Extend to 100 trading days: annualization switches on.
    let closes: Vec<_> = (0..100)
        .map(|i| {
            let close = 10000.0 + 709.0 * i as f64 / 99.0;
            (today - Duration::days(99 - i), close)
        })
        .collect();
    seed_store_bars(&app, "487240", &closes);

    let (status, body) = send(&app.router, get("/api/etfs/487240/metrics?period=1y")).await;
    assert_eq!(status, StatusCode::OK);
    let period = body["period_return"].as_f64().unwrap();
    let n = body["trading_days"].as_u64().unwrap() as f64;
    let expected = ((1.0 + period / 100.0_f64).powf(365.0 / n) - 1.0) * 100.0;
    let annualized = body["annualized_return"].as_f64().unwrap();
    assert!((annualized - expected).abs() < 1e-6);
}

#[tokio::test]
async fn compare_normalizes_to_100_and_reports_correlation() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let app = test_app(Arc::clone(&upstream));
    register_etf(&app, "100001", "ETF A");
    register_etf(&app, "100002", "ETF B");

    let today = today_kst();
    let days = [
        today - Duration::days(2),
        today - Duration::days(1),
        today,
    ];
    seed_store_bars(
        &app,
        "100001",
        &[(days[0], 100.0), (days[1], 110.0), (days[2], 121.0)],
    );
    seed_store_bars(
        &app,
        "100002",
        &[(days[0], 200.0), (days[1], 210.0), (days[2], 231.0)],
    );

    let (status, body) = send(
        &app.router,
        get("/api/etfs/compare?tickers=100001,100002"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let t1 = body["normalized_prices"]["100001"].as_array().unwrap();
    assert_eq!(t1[0], 100.0);
    assert_eq!(t1[1], 110.0);
    assert_eq!(t1[2], 121.0);
    let t2 = body["normalized_prices"]["100002"].as_array().unwrap();
    assert!((t2[1].as_f64().unwrap() - 105.0).abs() < 1e-9);
    assert!((t2[2].as_f64().unwrap() - 115.5).abs() < 1e-9);

    let corr = body["correlation"].as_array().unwrap();
    assert_eq!(corr[0][0], 1.0);
    assert_eq!(corr[1][1], 1.0);
    assert!((corr[0][1].as_f64().unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(corr[0][1], corr[1][0]);
}

#[tokio::test]
async fn dca_carry_matches_hand_computed_example() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let app = test_app(Arc::clone(&upstream));
    register_etf(&app, "487240", "KODEX AI전력핵심설비");

    let d = |m: u32| chrono::NaiveDate::from_ymd_opt(2025, m, 2).unwrap();
    seed_store_bars(
        &app,
        "487240",
        &[(d(1), 10000.0), (d(2), 11000.0), (d(3), 9000.0)],
    );

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/simulation/dca",
            json!({
                "ticker": "487240",
                "monthly_amount": 100000.0,
                "start_date": "2025-01-01",
                "end_date": "2025-03-31",
                "buy_day": 1
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let months = body["months"].as_array().unwrap();
    assert_eq!(months.len(), 3);
    assert_eq!(months[0]["shares_bought"], 10);
    assert_eq!(months[1]["shares_bought"], 9);
    assert!((months[1]["carry_after"].as_f64().unwrap() - 1000.0).abs() < 1e-9);
    assert_eq!(months[2]["shares_bought"], 11);
    assert!((months[2]["carry_after"].as_f64().unwrap() - 2000.0).abs() < 1e-9);

    assert_eq!(body["total_shares"], 30);
    assert!((body["total_invested"].as_f64().unwrap() - 300000.0).abs() < 1e-9);
    assert!((body["avg_buy_price"].as_f64().unwrap() - 10000.0).abs() < 1e-9);
}

#[tokio::test]
async fn duplicate_triggers_within_window_are_flagged() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let app = test_app(Arc::clone(&upstream));
    register_etf(&app, "487240", "KODEX AI전력핵심설비");

    let (status, rule) = send(
        &app.router,
        post_json(
            "/api/alerts/",
            json!({
                "ticker": "487240",
                "alert_type": "buy",
                "direction": "below",
                "target_price": 9500.0
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let rule_id = rule["id"].as_i64().unwrap();

    let trigger_body = json!({
        "rule_id": rule_id,
        "ticker": "487240",
        "alert_type": "buy",
        "message": "목표가 도달"
    });

    let (status, first) = send(&app.router, post_json("/api/alerts/trigger", trigger_body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["duplicate"], false);

    let (status, second) = send(&app.router, post_json("/api/alerts/trigger", trigger_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["duplicate"], true);

    // Both deliveries are in the history.
    let (_, history) = send(&app.router, get("/api/alerts/history/487240")).await;
    assert_eq!(history.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn collect_all_is_single_flight() {
    let upstream = Arc::new(SlowUpstream::default());
    let store = Arc::new(etfwatch_backend::store::Store::open_in_memory().unwrap());
    let cache = Arc::new(etfwatch_backend::cache::Cache::new(64));
    let collector = Arc::new(etfwatch_backend::collector::Collector::new(
        Arc::clone(&store),
        Arc::clone(&upstream) as Arc<dyn etfwatch_backend::upstream::UpstreamApi>,
        cache,
    ));
    store
        .add_ticker(&etfwatch_backend::models::TickerInfo {
            ticker: "487240".into(),
            name: "slow".into(),
            asset_type: etfwatch_backend::models::AssetType::Etf,
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

    let first = {
        let collector = Arc::clone(&collector);
        tokio::spawn(async move { collector.collect_all(5).await })
    };
    // Give the first run time to take the flag.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second = collector.collect_all(5).await;
    assert!(matches!(
        second,
        Err(etfwatch_backend::collector::CollectError::AlreadyRunning(_))
    ));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.total, 1);
}

/// Upstream whose bar fetch blocks long enough to observe overlap.
#[derive(Default)]
struct SlowUpstream;

#[async_trait::async_trait]
impl etfwatch_backend::upstream::UpstreamApi for SlowUpstream {
    async fn fetch_daily_bars(
        &self,
        ticker: &str,
        _days: u32,
    ) -> etfwatch_backend::upstream::UpstreamResult<Vec<etfwatch_backend::models::DailyBar>> {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        Ok(vec![etfwatch_backend::models::DailyBar {
            ticker: ticker.to_string(),
            date: today_kst(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1,
            daily_change_pct: None,
        }])
    }
    async fn fetch_trading_flows(
        &self,
        _: &str,
        _: u32,
    ) -> etfwatch_backend::upstream::UpstreamResult<Vec<etfwatch_backend::models::TradingFlow>> {
        Ok(vec![])
    }
    async fn fetch_intraday_ticks(
        &self,
        _: &str,
        _: u32,
    ) -> etfwatch_backend::upstream::UpstreamResult<Vec<etfwatch_backend::models::IntradayTick>> {
        Ok(vec![])
    }
    async fn fetch_news(
        &self,
        _: &str,
        _: u32,
        _: &[String],
    ) -> etfwatch_backend::upstream::UpstreamResult<Vec<etfwatch_backend::models::NewsItem>> {
        Ok(vec![])
    }
    async fn fetch_stock_fundamentals(
        &self,
        t: &str,
    ) -> etfwatch_backend::upstream::UpstreamResult<etfwatch_backend::models::StockFundamentals>
    {
        Ok(etfwatch_backend::models::StockFundamentals {
            ticker: t.into(),
            date: today_kst(),
            per: None,
            pbr: None,
            roe: None,
            eps: None,
            bps: None,
        })
    }
    async fn fetch_etf_fundamentals(
        &self,
        t: &str,
    ) -> etfwatch_backend::upstream::UpstreamResult<etfwatch_backend::models::EtfFundamentals> {
        Ok(etfwatch_backend::models::EtfFundamentals {
            ticker: t.into(),
            date: today_kst(),
            nav: None,
            expense_ratio: None,
        })
    }
    async fn fetch_etf_holdings(
        &self,
        _: &str,
    ) -> etfwatch_backend::upstream::UpstreamResult<Vec<etfwatch_backend::models::EtfHolding>> {
        Ok(vec![])
    }
    async fn fetch_catalog(
        &self,
    ) -> etfwatch_backend::upstream::UpstreamResult<Vec<etfwatch_backend::models::CatalogEntry>>
    {
        Ok(vec![])
    }
    async fn validate_ticker(
        &self,
        _: &str,
    ) -> etfwatch_backend::upstream::UpstreamResult<etfwatch_backend::models::TickerValidation>
    {
        Ok(etfwatch_backend::models::TickerValidation {
            valid: false,
            name: None,
            asset_type: None,
        })
    }
}
