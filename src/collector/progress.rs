//! Shared progress state for long-running background jobs.
//!
//! One progress slot exists per job kind. Consumers poll snapshots;
//! cancellation is cooperative through `cancel_requested`, which the
//! running job checks between tickers and between sub-fetches.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    CollectAll,
    CatalogCollect,
    ScreeningCollect,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::CollectAll => "collect-all",
            JobKind::CatalogCollect => "catalog-collect",
            JobKind::ScreeningCollect => "screening-collect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    InProgress,
    Completed,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub status: JobStatus,
    pub current: u32,
    pub total: u32,
    pub message: String,
    pub percent: f64,
    pub phase: String,
    pub cancel_requested: bool,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            status: JobStatus::Idle,
            current: 0,
            total: 0,
            message: String::new(),
            percent: 0.0,
            phase: String::new(),
            cancel_requested: false,
        }
    }
}

#[derive(Default)]
pub struct ProgressRegistry {
    jobs: Mutex<HashMap<JobKind, Progress>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, kind: JobKind) -> Progress {
        self.jobs.lock().get(&kind).cloned().unwrap_or_default()
    }

    /// Transition a job to in-progress and clear any stale cancel request.
    pub fn start(&self, kind: JobKind, total: u32, phase: &str) {
        let mut jobs = self.jobs.lock();
        jobs.insert(
            kind,
            Progress {
                status: JobStatus::InProgress,
                current: 0,
                total,
                message: String::new(),
                percent: 0.0,
                phase: phase.to_string(),
                cancel_requested: false,
            },
        );
    }

    pub fn update(&self, kind: JobKind, current: u32, message: impl Into<String>) {
        let mut jobs = self.jobs.lock();
        if let Some(p) = jobs.get_mut(&kind) {
            p.current = current;
            p.message = message.into();
            p.percent = if p.total == 0 {
                0.0
            } else {
                f64::from(current) / f64::from(p.total) * 100.0
            };
        }
    }

    pub fn set_phase(&self, kind: JobKind, phase: &str) {
        let mut jobs = self.jobs.lock();
        if let Some(p) = jobs.get_mut(&kind) {
            p.phase = phase.to_string();
        }
    }

    pub fn finish(&self, kind: JobKind, status: JobStatus, message: impl Into<String>) {
        let mut jobs = self.jobs.lock();
        if let Some(p) = jobs.get_mut(&kind) {
            p.status = status;
            p.message = message.into();
            if status == JobStatus::Completed {
                p.current = p.total;
                p.percent = 100.0;
            }
        }
    }

    /// Request cooperative cancellation. Returns false when the job is not
    /// currently running.
    pub fn request_cancel(&self, kind: JobKind) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(&kind) {
            Some(p) if p.status == JobStatus::InProgress => {
                p.cancel_requested = true;
                true
            }
            _ => false,
        }
    }

    pub fn cancel_requested(&self, kind: JobKind) -> bool {
        self.jobs
            .lock()
            .get(&kind)
            .map(|p| p.cancel_requested)
            .unwrap_or(false)
    }
}
