//! The `/v1/health` and `/v1/ready` shapes (§6), assembled from a small
//! atomic scoreboard each long-lived task updates. Grounded in the
//! teacher's habit of aggregating subsystem state into one report struct
//! (`WorkspaceInfo` in the teacher's `workspace::init`), generalized here
//! since the source file itself was domain-specific (monorepo/language
//! detection) and did not survive the transform.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub late_spans_total: u64,
    pub disk_errors_total: u64,
    pub rule_store_ready: bool,
}

/// Shared, lock-free scoreboard updated by the ingestion, completion, and
/// evaluator tasks; read by the health/readiness endpoints.
pub struct HealthScoreboard {
    started_at: Instant,
    degraded: AtomicBool,
    late_spans_total: AtomicU64,
    disk_errors_total: AtomicU64,
    rule_store_ready: AtomicBool,
}

impl HealthScoreboard {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            degraded: AtomicBool::new(false),
            late_spans_total: AtomicU64::new(0),
            disk_errors_total: AtomicU64::new(0),
            rule_store_ready: AtomicBool::new(false),
        }
    }

    pub fn mark_degraded(&self) {
        self.degraded.store(true, Ordering::Relaxed);
    }

    pub fn record_late_span(&self) {
        self.late_spans_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_error(&self) {
        self.disk_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_rule_store_ready(&self) {
        self.rule_store_ready.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.rule_store_ready.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: if self.degraded.load(Ordering::Relaxed) {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            },
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            late_spans_total: self.late_spans_total.load(Ordering::Relaxed),
            disk_errors_total: self.disk_errors_total.load(Ordering::Relaxed),
            rule_store_ready: self.rule_store_ready.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthScoreboard {
    fn default() -> Self {
        Self::new()
    }
}
