//! TickDriver — the periodic loop around the scheduler.
//!
//! Sequences the I/O of one tick: read the signal sources, run the
//! scheduling pass, raise alerts, report metrics. Ticks never overlap;
//! a slow tick delays the next one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use powercycle_core::{
    AlertSink, Clock, ConnectivityCheck, MetricsSink, PowerAvailabilitySource, SchedulerSettings,
    SchedulingContext, StabilitySignalSource, SystemClock, TickReport, UnitPower,
};

use crate::alerts::AlertPolicy;
use crate::error::SchedulerResult;
use crate::scheduler::CyclingScheduler;

pub struct TickDriver {
    scheduler: CyclingScheduler,
    stability: Arc<dyn StabilitySignalSource>,
    power: Arc<dyn PowerAvailabilitySource>,
    metrics: Arc<dyn MetricsSink>,
    alerts: Arc<dyn AlertSink>,
    connectivity: Option<Arc<dyn ConnectivityCheck>>,
    policy: AlertPolicy,
    unit_power: UnitPower,
    stability_threshold: f64,
    clock: Arc<dyn Clock>,
}

impl TickDriver {
    pub fn new(
        scheduler: CyclingScheduler,
        stability: Arc<dyn StabilitySignalSource>,
        power: Arc<dyn PowerAvailabilitySource>,
        metrics: Arc<dyn MetricsSink>,
        alerts: Arc<dyn AlertSink>,
        settings: &SchedulerSettings,
    ) -> Self {
        Self {
            scheduler,
            stability,
            power,
            metrics,
            alerts,
            connectivity: None,
            policy: AlertPolicy::new(settings.stability_threshold, settings.safe_ceiling_kw),
            unit_power: settings.unit_power,
            stability_threshold: settings.stability_threshold,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used to stamp tick reports.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Check upstream connectivity on every tick. It is reported, never
    /// used to gate scheduling.
    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityCheck>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Run one complete tick.
    ///
    /// Alerts are evaluated even if the scheduling pass fails; metrics are
    /// only reported for completed passes.
    pub async fn tick(&mut self) -> SchedulerResult<TickReport> {
        let at = self.clock.now();
        let network = async {
            match &self.connectivity {
                Some(check) => Some(check.is_up().await),
                None => None,
            }
        };
        let (reading, available_power_kw, network_up) =
            tokio::join!(self.stability.read(), self.power.read(), network);

        let stability_ok = reading.ok && reading.value >= self.stability_threshold;
        let ctx = SchedulingContext {
            available_power_kw,
            stability_ok,
            unit_power: self.unit_power,
        };

        let result = self.scheduler.run_tick(&ctx).await;

        let alerts = self.policy.evaluate(reading.value, available_power_kw);
        for message in &alerts {
            match self.alerts.send(message).await {
                Ok(()) => warn!(alert = %message, "alert sent"),
                Err(e) => error!(alert = %message, error = %e, "alert delivery failed"),
            }
        }

        let outcome = result?;
        let report = TickReport {
            at,
            available_power_kw,
            stability_value: reading.value,
            stability_ok,
            supply_shortfall: outcome.max_active < outcome.device_count,
            network_up,
            outcome,
            alerts,
        };
        self.metrics.record_tick(&report).await;
        Ok(report)
    }

    /// Tick every `interval` until `shutdown` flips.
    ///
    /// A pass already in progress is allowed to finish.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "tick driver started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    match self.tick().await {
                        Ok(report) => debug!(
                            active = report.active_count(),
                            max_active = report.outcome.max_active,
                            issued = report.outcome.issued(),
                            failed = report.outcome.failed(),
                            power_kw = report.available_power_kw,
                            stability = report.stability_value,
                            "tick complete"
                        ),
                        Err(e) => error!(error = %e, "scheduling pass failed"),
                    }
                    let elapsed = started.elapsed();
                    if elapsed > interval {
                        warn!(
                            elapsed_ms = elapsed.as_millis() as u64,
                            interval_ms = interval.as_millis() as u64,
                            "tick overran its interval"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    info!("tick driver shutting down");
                    break;
                }
            }
        }
    }
}
