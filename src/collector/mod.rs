//! Ingestion orchestration: upstream fetches into store writes.
//!
//! Smart collection only fetches the gap since the last persisted date, so
//! batches stay idempotent and self-healing. Batch jobs are single-flight
//! behind atomic flags and report through the shared progress registry.

pub mod progress;

pub use progress::{JobKind, JobStatus, Progress, ProgressRegistry};

use crate::cache::{kind_tag, ticker_tag, Cache};
use crate::models::{today_kst, AssetType, CatalogEntry, TickerInfo};
use crate::store::{CollectionDelta, Store, StoreError};
use crate::upstream::{UpstreamApi, UpstreamError};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Gap-backfill depth cap for on-demand reads.
const MAX_BACKFILL_DAYS: u32 = 365;
/// Outer budget for a multi-page intraday scrape.
const INTRADAY_BUDGET: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

pub type CollectResult<T> = Result<T, CollectError>;

/// Window actually fetched for a requested `days`, given the last persisted
/// date: everything when no state exists, nothing when already current,
/// otherwise just the gap.
pub fn smart_window(last_date: Option<NaiveDate>, days: u32, today: NaiveDate) -> u32 {
    match last_date {
        None => days,
        Some(last) => {
            let gap = (today - last).num_days();
            if gap <= 0 {
                0
            } else {
                (gap as u32).min(days)
            }
        }
    }
}

/// Releases its single-flight flag when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, name: &'static str) -> CollectResult<Self> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CollectError::AlreadyRunning(name));
        }
        Ok(Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TickerCollectReport {
    pub ticker: String,
    pub success: bool,
    pub price_records: usize,
    pub flow_records: usize,
    pub news_records: usize,
    pub fundamentals_collected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectAllReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub price_records: usize,
    pub flow_records: usize,
    pub news_records: usize,
    pub details: Vec<TickerCollectReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FundamentalsReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub details: Vec<(String, bool)>,
}

pub struct Collector {
    store: Arc<Store>,
    upstream: Arc<dyn UpstreamApi>,
    cache: Arc<Cache>,
    pub progress: Arc<ProgressRegistry>,
    is_collecting: AtomicBool,
    is_collecting_fundamentals: AtomicBool,
    is_collecting_catalog: AtomicBool,
    is_collecting_screening: AtomicBool,
}

impl Collector {
    pub fn new(store: Arc<Store>, upstream: Arc<dyn UpstreamApi>, cache: Arc<Cache>) -> Self {
        Self {
            store,
            upstream,
            cache,
            progress: Arc::new(ProgressRegistry::new()),
            is_collecting: AtomicBool::new(false),
            is_collecting_fundamentals: AtomicBool::new(false),
            is_collecting_catalog: AtomicBool::new(false),
            is_collecting_screening: AtomicBool::new(false),
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.is_collecting.load(Ordering::Acquire)
    }

    // ---- single-ticker operations -------------------------------------

    /// Collect daily bars, fetching only the missing window. Returns rows
    /// written (0 when already current).
    pub async fn collect_prices(&self, ticker: &str, days: u32) -> CollectResult<usize> {
        let state = self.store.collection_state(ticker)?;
        let actual = smart_window(state.and_then(|s| s.last_price_date), days, today_kst());
        if actual == 0 {
            info!(%ticker, "prices current, skipping");
            return Ok(0);
        }

        let now = Utc::now();
        match self.upstream.fetch_daily_bars(ticker, actual).await {
            Ok(bars) => {
                let written = self.store.upsert_daily_bars(&bars)?;
                let max_date = bars.iter().map(|b| b.date).max();
                self.store.update_collection_state(
                    ticker,
                    &CollectionDelta {
                        last_price_date: max_date,
                        price_records_added: written as i64,
                        ..CollectionDelta::success(now)
                    },
                )?;
                self.cache.invalidate_tag(&ticker_tag(ticker));
                info!(%ticker, written, "collected daily bars");
                Ok(written)
            }
            Err(e) => {
                self.store
                    .update_collection_state(ticker, &CollectionDelta::failed(now))?;
                Err(e.into())
            }
        }
    }

    pub async fn collect_trading_flows(&self, ticker: &str, days: u32) -> CollectResult<usize> {
        let state = self.store.collection_state(ticker)?;
        let actual = smart_window(
            state.and_then(|s| s.last_trading_flow_date),
            days,
            today_kst(),
        );
        if actual == 0 {
            return Ok(0);
        }

        let now = Utc::now();
        match self.upstream.fetch_trading_flows(ticker, actual).await {
            Ok(flows) => {
                let written = self.store.upsert_trading_flows(&flows)?;
                let max_date = flows.iter().map(|f| f.date).max();
                self.store.update_collection_state(
                    ticker,
                    &CollectionDelta {
                        last_trading_flow_date: max_date,
                        trading_flow_records_added: written as i64,
                        ..CollectionDelta::success(now)
                    },
                )?;
                self.cache.invalidate_tag(&ticker_tag(ticker));
                Ok(written)
            }
            Err(e) => {
                self.store
                    .update_collection_state(ticker, &CollectionDelta::failed(now))?;
                Err(e.into())
            }
        }
    }

    /// Prices plus flows, the `/collect` endpoint semantics.
    pub async fn collect_ticker(&self, ticker: &str, days: u32) -> CollectResult<(usize, usize)> {
        let prices = self.collect_prices(ticker, days).await?;
        let flows = self.collect_trading_flows(ticker, days).await?;
        Ok((prices, flows))
    }

    pub async fn collect_news(&self, ticker: &str, days: u32) -> CollectResult<usize> {
        let keywords = self
            .store
            .get_ticker(ticker)?
            .map(|info| {
                let mut kw = info.relevance_keywords;
                if let Some(s) = info.search_keyword {
                    kw.insert(0, s);
                }
                kw
            })
            .unwrap_or_default();

        let now = Utc::now();
        match self.upstream.fetch_news(ticker, days, &keywords).await {
            Ok(items) => {
                let written = self.store.upsert_news(&items)?;
                self.store.update_collection_state(
                    ticker,
                    &CollectionDelta {
                        last_news_collected_at: Some(now),
                        news_records_added: written as i64,
                        ..CollectionDelta::success(now)
                    },
                )?;
                self.cache.invalidate_tag(&ticker_tag(ticker));
                Ok(written)
            }
            Err(e) => {
                self.store
                    .update_collection_state(ticker, &CollectionDelta::failed(now))?;
                Err(e.into())
            }
        }
    }

    /// Fundamentals for one ticker, dispatched by instrument class.
    pub async fn collect_fundamentals(&self, ticker: &str) -> CollectResult<()> {
        let info = self.store.get_ticker(ticker)?;
        let asset_type = info.map(|i| i.asset_type).unwrap_or(AssetType::Stock);
        match asset_type {
            AssetType::Stock => {
                let f = self.upstream.fetch_stock_fundamentals(ticker).await?;
                self.store.upsert_stock_fundamentals(&f)?;
            }
            AssetType::Etf => {
                let f = self.upstream.fetch_etf_fundamentals(ticker).await?;
                self.store.upsert_etf_fundamentals(&f)?;
                let holdings = self.upstream.fetch_etf_holdings(ticker).await?;
                self.store.upsert_etf_holdings(&holdings)?;
            }
        }
        self.cache.invalidate_tag(&kind_tag("fundamentals"));
        Ok(())
    }

    /// Intraday ticks under the extended session budget. Empty results are
    /// returned as-is and never cached.
    pub async fn collect_intraday(&self, ticker: &str, pages: u32) -> CollectResult<usize> {
        let fetch = self.upstream.fetch_intraday_ticks(ticker, pages);
        let ticks = tokio::time::timeout(INTRADAY_BUDGET, fetch)
            .await
            .map_err(|_| UpstreamError::unavailable("intraday collection budget exceeded"))??;
        let written = self.store.upsert_intraday_ticks(&ticks)?;
        if written > 0 {
            self.cache.invalidate_tag(&ticker_tag(ticker));
        }
        Ok(written)
    }

    /// Gap-backfill used by read paths with `auto_collect`: when local bars
    /// do not cover `end`, collect just the missing window (≤365 days).
    pub async fn ensure_price_coverage(&self, ticker: &str, end: NaiveDate) -> CollectResult<usize> {
        let latest = self.store.latest_bar(ticker)?.map(|b| b.date);
        let gap = match latest {
            None => MAX_BACKFILL_DAYS,
            Some(last) => {
                let missing = (end - last).num_days();
                if missing <= 0 {
                    return Ok(0);
                }
                (missing as u32).min(MAX_BACKFILL_DAYS)
            }
        };
        self.collect_prices(ticker, gap).await
    }

    // ---- batch operations ---------------------------------------------

    /// Collect prices, flows, news and fundamentals for the whole watchlist.
    /// Per-ticker failures land in the report; only a second concurrent
    /// invocation is an error.
    pub async fn collect_all(&self, days: u32) -> CollectResult<CollectAllReport> {
        let _guard = FlightGuard::acquire(&self.is_collecting, "collect-all")?;

        let watchlist = self.store.list_tickers()?;
        self.progress
            .start(JobKind::CollectAll, watchlist.len() as u32, "collecting");

        let mut report = CollectAllReport {
            total: watchlist.len(),
            success: 0,
            failed: 0,
            cancelled: false,
            price_records: 0,
            flow_records: 0,
            news_records: 0,
            details: Vec::with_capacity(watchlist.len()),
        };

        for (idx, info) in watchlist.iter().enumerate() {
            if self.progress.cancel_requested(JobKind::CollectAll) {
                report.cancelled = true;
                break;
            }
            self.progress.update(
                JobKind::CollectAll,
                idx as u32,
                format!("{} ({})", info.name, info.ticker),
            );

            let detail = self.collect_one_for_batch(info, days).await;
            if detail.success {
                report.success += 1;
            } else {
                report.failed += 1;
            }
            report.price_records += detail.price_records;
            report.flow_records += detail.flow_records;
            report.news_records += detail.news_records;
            report.details.push(detail);
        }

        let status = if report.cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        self.progress.finish(
            JobKind::CollectAll,
            status,
            format!("{} ok, {} failed", report.success, report.failed),
        );
        info!(
            success = report.success,
            failed = report.failed,
            cancelled = report.cancelled,
            "collect-all finished"
        );
        Ok(report)
    }

    /// One watchlist entry inside a batch: sub-tasks run in order, each
    /// failure recorded without aborting the others. Cancellation is checked
    /// between sub-tasks.
    async fn collect_one_for_batch(&self, info: &TickerInfo, days: u32) -> TickerCollectReport {
        let ticker = info.ticker.as_str();
        let mut detail = TickerCollectReport {
            ticker: ticker.to_string(),
            success: true,
            price_records: 0,
            flow_records: 0,
            news_records: 0,
            fundamentals_collected: false,
            error: None,
        };
        let record_err = |slot: &mut Option<String>, stage: &str, e: CollectError| {
            warn!(%ticker, stage, error = %e, "batch sub-task failed");
            *slot = Some(format!("{stage}: {e}"));
        };

        match self.collect_prices(ticker, days).await {
            Ok(n) => detail.price_records = n,
            Err(e) => record_err(&mut detail.error, "prices", e),
        }
        if self.progress.cancel_requested(JobKind::CollectAll) {
            detail.success = detail.error.is_none();
            return detail;
        }
        match self.collect_trading_flows(ticker, days).await {
            Ok(n) => detail.flow_records = n,
            Err(e) => record_err(&mut detail.error, "flows", e),
        }
        if self.progress.cancel_requested(JobKind::CollectAll) {
            detail.success = detail.error.is_none();
            return detail;
        }
        match self.collect_news(ticker, days.min(7)).await {
            Ok(n) => detail.news_records = n,
            Err(e) => record_err(&mut detail.error, "news", e),
        }
        match self.collect_fundamentals(ticker).await {
            Ok(()) => detail.fundamentals_collected = true,
            Err(e) => record_err(&mut detail.error, "fundamentals", e),
        }

        detail.success = detail.error.is_none();
        detail
    }

    /// Historical backfill: ignores collection-state watermarks and fetches
    /// the full window for every watchlist entry.
    pub async fn backfill(&self, days: u32) -> CollectResult<CollectAllReport> {
        let _guard = FlightGuard::acquire(&self.is_collecting, "collect-all")?;

        let watchlist = self.store.list_tickers()?;
        let mut report = CollectAllReport {
            total: watchlist.len(),
            success: 0,
            failed: 0,
            cancelled: false,
            price_records: 0,
            flow_records: 0,
            news_records: 0,
            details: Vec::with_capacity(watchlist.len()),
        };

        for info in &watchlist {
            let ticker = info.ticker.as_str();
            let now = Utc::now();
            let mut detail = TickerCollectReport {
                ticker: ticker.to_string(),
                success: true,
                price_records: 0,
                flow_records: 0,
                news_records: 0,
                fundamentals_collected: false,
                error: None,
            };

            match self.upstream.fetch_daily_bars(ticker, days).await {
                Ok(bars) => {
                    let written = self.store.upsert_daily_bars(&bars).unwrap_or(0);
                    let max_date = bars.iter().map(|b| b.date).max();
                    let _ = self.store.update_collection_state(
                        ticker,
                        &CollectionDelta {
                            last_price_date: max_date,
                            price_records_added: written as i64,
                            ..CollectionDelta::success(now)
                        },
                    );
                    detail.price_records = written;
                }
                Err(e) => {
                    detail.success = false;
                    detail.error = Some(format!("prices: {e}"));
                    let _ = self
                        .store
                        .update_collection_state(ticker, &CollectionDelta::failed(now));
                }
            }

            match self.upstream.fetch_trading_flows(ticker, days).await {
                Ok(flows) => {
                    let written = self.store.upsert_trading_flows(&flows).unwrap_or(0);
                    let max_date = flows.iter().map(|f| f.date).max();
                    let _ = self.store.update_collection_state(
                        ticker,
                        &CollectionDelta {
                            last_trading_flow_date: max_date,
                            trading_flow_records_added: written as i64,
                            ..CollectionDelta::success(now)
                        },
                    );
                    detail.flow_records = written;
                }
                Err(e) => {
                    detail.success = false;
                    detail.error.get_or_insert_with(|| format!("flows: {e}"));
                }
            }

            self.cache.invalidate_tag(&ticker_tag(ticker));
            if detail.success {
                report.success += 1;
            } else {
                report.failed += 1;
            }
            report.price_records += detail.price_records;
            report.flow_records += detail.flow_records;
            report.details.push(detail);
        }

        Ok(report)
    }

    /// Fundamentals for the whole watchlist, guarded separately from
    /// collect-all so the two batches may overlap.
    pub async fn collect_fundamentals_all(&self) -> CollectResult<FundamentalsReport> {
        let _guard = FlightGuard::acquire(&self.is_collecting_fundamentals, "fundamentals-collect")?;

        let watchlist = self.store.list_tickers()?;
        let mut report = FundamentalsReport {
            total: watchlist.len(),
            success: 0,
            failed: 0,
            details: Vec::with_capacity(watchlist.len()),
        };
        for info in &watchlist {
            match self.collect_fundamentals(&info.ticker).await {
                Ok(()) => {
                    report.success += 1;
                    report.details.push((info.ticker.clone(), true));
                }
                Err(e) => {
                    warn!(ticker = %info.ticker, error = %e, "fundamentals failed");
                    report.failed += 1;
                    report.details.push((info.ticker.clone(), false));
                }
            }
        }
        Ok(report)
    }

    // ---- background jobs ----------------------------------------------

    /// Refresh the catalog universe in the background. Fails fast when a
    /// refresh is already running.
    pub fn spawn_catalog_collect(self: &Arc<Self>) -> CollectResult<()> {
        let guard = FlightGuard::acquire(&self.is_collecting_catalog, "catalog-collect")?;
        // Hand the flag across the task boundary; the guard must not drop
        // until the job ends.
        std::mem::forget(guard);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.progress.start(JobKind::CatalogCollect, 0, "fetch");
            let result = this.run_catalog_collect().await;
            match result {
                Ok(Some(count)) => this.progress.finish(
                    JobKind::CatalogCollect,
                    JobStatus::Completed,
                    format!("{count} catalog entries"),
                ),
                Ok(None) => this
                    .progress
                    .finish(JobKind::CatalogCollect, JobStatus::Cancelled, "cancelled"),
                Err(e) => {
                    warn!(error = %e, "catalog collect failed");
                    this.progress
                        .finish(JobKind::CatalogCollect, JobStatus::Error, e.to_string());
                }
            }
            this.is_collecting_catalog.store(false, Ordering::Release);
        });
        Ok(())
    }

    /// `None` means the job observed a cancel request.
    async fn run_catalog_collect(&self) -> CollectResult<Option<usize>> {
        let entries = self.upstream.fetch_catalog().await?;
        if self.progress.cancel_requested(JobKind::CatalogCollect) {
            return Ok(None);
        }
        self.progress.set_phase(JobKind::CatalogCollect, "store");
        let count = self.store.upsert_catalog_entries(&entries)?;
        self.cache.invalidate_tag(&kind_tag("catalog"));
        Ok(Some(count))
    }

    /// Refresh screener snapshot columns for the full catalog in the
    /// background, with per-entry cancellation checks.
    pub fn spawn_screening_collect(self: &Arc<Self>) -> CollectResult<()> {
        let guard = FlightGuard::acquire(&self.is_collecting_screening, "screening-collect")?;
        std::mem::forget(guard);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = this.run_screening_collect().await;
            if let Err(e) = result {
                warn!(error = %e, "screening collect failed");
                this.progress
                    .finish(JobKind::ScreeningCollect, JobStatus::Error, e.to_string());
            }
            this.is_collecting_screening.store(false, Ordering::Release);
        });
        Ok(())
    }

    async fn run_screening_collect(&self) -> CollectResult<()> {
        let entries = self.store.catalog_entries()?;
        self.progress
            .start(JobKind::ScreeningCollect, entries.len() as u32, "snapshot");

        let mut updated = 0usize;
        for (idx, entry) in entries.iter().enumerate() {
            if self.progress.cancel_requested(JobKind::ScreeningCollect) {
                self.progress.finish(
                    JobKind::ScreeningCollect,
                    JobStatus::Cancelled,
                    format!("cancelled after {updated}"),
                );
                return Ok(());
            }
            self.progress
                .update(JobKind::ScreeningCollect, idx as u32, entry.ticker.clone());

            if let Err(e) = self.snapshot_catalog_entry(entry).await {
                warn!(ticker = %entry.ticker, error = %e, "snapshot failed");
                continue;
            }
            updated += 1;
        }

        self.cache.invalidate_tag(&kind_tag("screener"));
        self.progress.finish(
            JobKind::ScreeningCollect,
            JobStatus::Completed,
            format!("{updated} snapshots"),
        );
        Ok(())
    }

    /// One screener snapshot: a week of bars for returns plus the latest
    /// investor flows.
    async fn snapshot_catalog_entry(&self, entry: &CatalogEntry) -> CollectResult<()> {
        let mut bars = self.upstream.fetch_daily_bars(&entry.ticker, 6).await?;
        bars.sort_by_key(|b| b.date);
        let flows = self.upstream.fetch_trading_flows(&entry.ticker, 1).await?;

        let mut snapshot = entry.clone();
        if let Some(last) = bars.last() {
            snapshot.close_price = Some(last.close);
            snapshot.volume = Some(last.volume);
            if bars.len() >= 2 {
                let prev = &bars[bars.len() - 2];
                if prev.close != 0.0 {
                    snapshot.daily_change_pct =
                        Some((last.close - prev.close) / prev.close * 100.0);
                }
                let first = &bars[0];
                if first.close != 0.0 {
                    snapshot.weekly_return =
                        Some((last.close - first.close) / first.close * 100.0);
                }
            }
        }
        if let Some(flow) = flows.iter().max_by_key(|f| f.date) {
            snapshot.foreign_net = Some(flow.foreign_net);
            snapshot.institutional_net = Some(flow.institutional_net);
        }
        snapshot.catalog_updated_at = Some(Utc::now());
        self.store.update_catalog_snapshot(&snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn smart_window_full_when_no_state() {
        assert_eq!(smart_window(None, 30, d(2026, 7, 31)), 30);
    }

    #[test]
    fn smart_window_skips_when_current() {
        let today = d(2026, 7, 31);
        assert_eq!(smart_window(Some(today), 30, today), 0);
        // A stored future date (clock skew) must still skip.
        assert_eq!(smart_window(Some(d(2026, 8, 1)), 30, today), 0);
    }

    #[test]
    fn smart_window_is_min_of_gap_and_days() {
        let today = d(2026, 7, 31);
        assert_eq!(smart_window(Some(d(2026, 7, 28)), 30, today), 3);
        assert_eq!(smart_window(Some(d(2026, 1, 1)), 30, today), 30);
    }
}
