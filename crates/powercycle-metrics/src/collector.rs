//! Tick metrics collector.
//!
//! Counters are atomics; the latest report sits behind an async lock so
//! the dashboard can read it while the driver writes the next one.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use powercycle_core::{MetricsSink, TickReport};

/// Point-in-time view of everything [`TickMetrics`] has seen.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub latest: Option<TickReport>,
    pub ticks_total: u64,
    pub commands_issued_total: u64,
    pub commands_skipped_total: u64,
    pub commands_failed_total: u64,
    pub ledger_failures_total: u64,
    pub alerts_total: u64,
}

#[derive(Debug, Default)]
pub struct TickMetrics {
    latest: RwLock<Option<TickReport>>,
    ticks: AtomicU64,
    issued: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    ledger_failures: AtomicU64,
    alerts: AtomicU64,
}

impl TickMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent tick report, if any tick has completed.
    pub async fn latest(&self) -> Option<TickReport> {
        self.latest.read().await.clone()
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            latest: self.latest().await,
            ticks_total: self.ticks.load(Ordering::Relaxed),
            commands_issued_total: self.issued.load(Ordering::Relaxed),
            commands_skipped_total: self.skipped.load(Ordering::Relaxed),
            commands_failed_total: self.failed.load(Ordering::Relaxed),
            ledger_failures_total: self.ledger_failures.load(Ordering::Relaxed),
            alerts_total: self.alerts.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl MetricsSink for TickMetrics {
    async fn record_tick(&self, report: &TickReport) {
        let outcome = &report.outcome;
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.issued
            .fetch_add(outcome.issued() as u64, Ordering::Relaxed);
        self.skipped
            .fetch_add(outcome.skipped() as u64, Ordering::Relaxed);
        self.failed
            .fetch_add(outcome.failed() as u64, Ordering::Relaxed);
        self.ledger_failures
            .fetch_add(outcome.ledger_failures as u64, Ordering::Relaxed);
        self.alerts
            .fetch_add(report.alerts.len() as u64, Ordering::Relaxed);

        *self.latest.write().await = Some(report.clone());
        debug!(
            active = report.active_count(),
            power_kw = report.available_power_kw,
            stability = report.stability_value,
            shortfall = report.supply_shortfall,
            "tick metrics recorded"
        );
    }
}
