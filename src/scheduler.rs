//! Time-driven collection triggers on the KST calendar.
//!
//! A minute-resolution poll loop fires the daily batch on weekday mornings,
//! the fundamentals batch after the close, and the catalog refresh weekly.
//! A trigger that lands while the matching job still runs is skipped, never
//! queued. Dev deployments can switch to a fixed polling interval instead.

use crate::collector::{CollectError, Collector};
use crate::models::kst;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DAILY_AT: (u32, u32) = (9, 0);
const FUNDAMENTALS_AT: (u32, u32) = (16, 30);
const CATALOG_WEEKDAY: Weekday = Weekday::Mon;
const CATALOG_AT: (u32, u32) = (8, 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Daily,
    Fundamentals,
    Catalog,
}

#[derive(Debug, Clone, Default)]
struct SchedulerState {
    running: bool,
    last_collection_time: Option<DateTime<Utc>>,
    last_daily_date: Option<NaiveDate>,
    last_fundamentals_date: Option<NaiveDate>,
    last_catalog_week: Option<(i32, u32)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub name: &'static str,
    pub schedule: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub last_collection_time: Option<DateTime<Utc>>,
    pub next_collection_time: Option<DateTime<Utc>>,
    pub is_collecting: bool,
    pub jobs: Vec<JobInfo>,
}

pub struct Scheduler {
    collector: Arc<Collector>,
    default_days: u32,
    /// Fixed polling interval for dev; `None` follows the KST calendar.
    interval_minutes: Option<u64>,
    state: Mutex<SchedulerState>,
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn at((h, m): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid schedule time")
}

/// Next weekday 09:00 KST strictly after `now`.
fn next_daily_run(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let mut date = now.date_naive();
    if now.time() >= at(DAILY_AT) {
        date = date.succ_opt().expect("date range");
    }
    while !is_weekday(date) {
        date = date.succ_opt().expect("date range");
    }
    kst()
        .from_local_datetime(&date.and_time(at(DAILY_AT)))
        .single()
        .expect("KST has no gaps")
}

impl Scheduler {
    pub fn new(collector: Arc<Collector>, default_days: u32, interval_minutes: Option<u64>) -> Self {
        Self {
            collector,
            default_days,
            interval_minutes,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state.lock();
        let next = if self.interval_minutes.is_some() {
            state.last_collection_time.map(|t| {
                t + chrono::Duration::minutes(self.interval_minutes.unwrap_or(60) as i64)
            })
        } else {
            Some(next_daily_run(Utc::now().with_timezone(&kst())).with_timezone(&Utc))
        };
        SchedulerStatus {
            running: state.running,
            last_collection_time: state.last_collection_time,
            next_collection_time: next,
            is_collecting: self.collector.is_collecting(),
            jobs: vec![
                JobInfo {
                    name: "daily-collection",
                    schedule: "weekdays 09:00 KST",
                },
                JobInfo {
                    name: "fundamentals-collection",
                    schedule: "weekdays 16:30 KST",
                },
                JobInfo {
                    name: "catalog-refresh",
                    schedule: "Mondays 08:30 KST",
                },
            ],
        }
    }

    /// Triggers due at `now`, marking them fired so a busy collector makes
    /// the slot skip rather than queue.
    fn due_triggers(&self, now: DateTime<FixedOffset>) -> Vec<Trigger> {
        let today = now.date_naive();
        let mut due = Vec::new();
        let mut state = self.state.lock();

        if let Some(minutes) = self.interval_minutes {
            let elapsed_enough = state
                .last_collection_time
                .map(|t| Utc::now() - t >= chrono::Duration::minutes(minutes as i64))
                .unwrap_or(true);
            if elapsed_enough {
                state.last_collection_time = Some(Utc::now());
                due.push(Trigger::Daily);
            }
            return due;
        }

        if is_weekday(today)
            && now.time() >= at(DAILY_AT)
            && state.last_daily_date != Some(today)
        {
            state.last_daily_date = Some(today);
            state.last_collection_time = Some(Utc::now());
            due.push(Trigger::Daily);
        }
        if is_weekday(today)
            && now.time() >= at(FUNDAMENTALS_AT)
            && state.last_fundamentals_date != Some(today)
        {
            state.last_fundamentals_date = Some(today);
            due.push(Trigger::Fundamentals);
        }
        let week = today.iso_week();
        if today.weekday() == CATALOG_WEEKDAY
            && now.time() >= at(CATALOG_AT)
            && state.last_catalog_week != Some((week.year(), week.week()))
        {
            state.last_catalog_week = Some((week.year(), week.week()));
            due.push(Trigger::Catalog);
        }
        due
    }

    async fn fire(&self, trigger: Trigger) {
        match trigger {
            Trigger::Daily => match self.collector.collect_all(self.default_days).await {
                Ok(report) => info!(
                    success = report.success,
                    failed = report.failed,
                    "scheduled collection finished"
                ),
                Err(CollectError::AlreadyRunning(job)) => {
                    info!(job, "scheduled collection skipped, already running")
                }
                Err(e) => warn!(error = %e, "scheduled collection failed"),
            },
            Trigger::Fundamentals => match self.collector.collect_fundamentals_all().await {
                Ok(report) => info!(
                    success = report.success,
                    failed = report.failed,
                    "scheduled fundamentals finished"
                ),
                Err(CollectError::AlreadyRunning(job)) => {
                    info!(job, "fundamentals skipped, already running")
                }
                Err(e) => warn!(error = %e, "scheduled fundamentals failed"),
            },
            Trigger::Catalog => {
                if let Err(e) = self.collector.spawn_catalog_collect() {
                    info!(error = %e, "catalog refresh skipped");
                }
            }
        }
    }

    /// Minute-resolution poll loop. Runs until the process exits.
    pub async fn run(self: Arc<Self>) {
        self.state.lock().running = true;
        info!("scheduler started");
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = Utc::now().with_timezone(&kst());
            for trigger in self.due_triggers(now) {
                self.fire(trigger).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::collector::Collector;
    use crate::store::Store;
    use crate::testutil::NoopUpstream;

    fn scheduler(interval: Option<u64>) -> Scheduler {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let collector = Arc::new(Collector::new(
            store,
            Arc::new(NoopUpstream),
            Arc::new(Cache::new(64)),
        ));
        Scheduler::new(collector, 30, interval)
    }

    fn kst_at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        kst()
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(y, m, d)
                    .unwrap()
                    .and_hms_opt(h, min, 0)
                    .unwrap(),
            )
            .single()
            .unwrap()
    }

    #[test]
    fn daily_trigger_fires_once_per_weekday() {
        let sched = scheduler(None);
        // 2026-07-31 is a Friday.
        let morning = kst_at(2026, 7, 31, 9, 1);
        assert_eq!(sched.due_triggers(morning), vec![Trigger::Daily]);
        // Next poll on the same day stays quiet.
        assert!(sched.due_triggers(morning).is_empty());
    }

    #[test]
    fn nothing_fires_on_weekends() {
        let sched = scheduler(None);
        // 2026-08-01 is a Saturday.
        let saturday = kst_at(2026, 8, 1, 9, 30);
        assert!(sched.due_triggers(saturday).is_empty());
    }

    #[test]
    fn afternoon_adds_fundamentals() {
        let sched = scheduler(None);
        let late = kst_at(2026, 7, 31, 16, 35);
        let due = sched.due_triggers(late);
        assert!(due.contains(&Trigger::Daily));
        assert!(due.contains(&Trigger::Fundamentals));
    }

    #[test]
    fn monday_morning_includes_catalog_refresh() {
        let sched = scheduler(None);
        // 2026-07-27 is a Monday.
        let monday = kst_at(2026, 7, 27, 9, 0);
        let due = sched.due_triggers(monday);
        assert!(due.contains(&Trigger::Catalog));
        assert!(due.contains(&Trigger::Daily));
    }

    #[test]
    fn interval_mode_ignores_calendar() {
        let sched = scheduler(Some(10));
        let saturday = kst_at(2026, 8, 1, 3, 0);
        assert_eq!(sched.due_triggers(saturday), vec![Trigger::Daily]);
        // Fired just now, so the next poll waits for the interval.
        assert!(sched.due_triggers(saturday).is_empty());
    }

    #[test]
    fn next_run_skips_weekend() {
        // Friday after 09:00 rolls to Monday.
        let friday_noon = kst_at(2026, 7, 31, 12, 0);
        let next = next_daily_run(friday_noon);
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2026, 8, 3).unwrap());
        assert_eq!(next.time(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    }
}
