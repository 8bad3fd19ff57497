//! Subsystem assembly.
//!
//! Builds the ledger, adapters, scheduler and driver from a validated
//! configuration, then runs the tick loop next to the HTTP API until
//! shutdown.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use powercycle_adapters::{
    FallbackPool, FanoutAlertSink, HttpConnectivityCheck, HttpPowerMeter, HttpRigPort,
    LogAlertSink, ModbusStabilitySource, StaticPowerSource, WebhookAlertSink,
};
use powercycle_api::{ApiState, build_router};
use powercycle_core::config::duration;
use powercycle_core::{
    AlertSink, ConnectivityCheck, PowerAvailabilitySource, PowerCycleConfig, SchedulerSettings,
    SystemClock,
};
use powercycle_ledger::{DeviceLedger, RedbLedger};
use powercycle_metrics::TickMetrics;
use powercycle_scheduler::{CommandCache, CyclingScheduler, TickDriver};

/// Ledger file name inside the data directory.
pub const LEDGER_FILE: &str = "powercycle.redb";

/// A fully assembled daemon, ready to run.
pub struct Daemon {
    settings: SchedulerSettings,
    state: ApiState,
    driver: TickDriver,
}

impl Daemon {
    /// Validate `config`, open the ledger under `data_dir` and wire every
    /// subsystem.
    pub fn assemble(config: &PowerCycleConfig, data_dir: &Path) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;
        let settings = config.scheduler_settings()?;

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;
        let db_path = data_dir.join(LEDGER_FILE);
        let ledger = RedbLedger::open(&db_path)?;
        info!(path = ?db_path, "device ledger opened");

        let mut registered = 0;
        for id in &config.devices.ids {
            if ledger.record_observed_if_absent(id)? {
                registered += 1;
            }
        }
        info!(
            configured = config.devices.ids.len(),
            registered,
            total = ledger.len()?,
            "devices registered"
        );

        let ledger: Arc<dyn DeviceLedger> = Arc::new(ledger);
        let cache = CommandCache::new(Arc::new(SystemClock));
        let metrics = Arc::new(TickMetrics::new());

        let port = Arc::new(HttpRigPort::new(
            config.rig.api_url.clone(),
            settings.command_timeout,
        ));
        let stability = Arc::new(ModbusStabilitySource::from_config(&config.stability)?);
        let scheduler = CyclingScheduler::new(ledger.clone(), cache.clone(), port, &settings);
        let mut driver = TickDriver::new(
            scheduler,
            stability,
            power_source(config)?,
            metrics.clone(),
            alert_sink(config)?,
            &settings,
        );
        if let Some(check) = connectivity(config)? {
            driver = driver.with_connectivity(check);
        }

        Ok(Self {
            settings,
            state: ApiState {
                ledger,
                cache,
                metrics,
            },
            driver,
        })
    }

    pub fn api_state(&self) -> &ApiState {
        &self.state
    }

    /// Run the tick loop and serve the API on `listener` until `shutdown`
    /// resolves. An in-progress tick finishes before this returns.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Self {
            settings,
            state,
            mut driver,
        } = self;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let interval = settings.poll_interval;
        let driver_handle = tokio::spawn(async move {
            driver.run(interval, shutdown_rx).await;
        });

        let router = build_router(state);
        info!(addr = ?listener.local_addr().ok(), "API server starting");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            })
            .await;

        let _ = driver_handle.await;
        served?;

        info!("powercycle daemon stopped");
        Ok(())
    }
}

fn power_source(config: &PowerCycleConfig) -> anyhow::Result<Arc<dyn PowerAvailabilitySource>> {
    let power = &config.power;
    match &power.meter_url {
        Some(url) => {
            let timeout = duration("power.read_timeout", &power.read_timeout)?;
            info!(%url, "using HTTP power meter");
            Ok(Arc::new(HttpPowerMeter::new(
                url.clone(),
                power.fallback_kw,
                timeout,
            )))
        }
        None => {
            if power.static_kw == 0.0 {
                warn!("no power meter and static_kw = 0; no device will be activated");
            }
            info!(kw = power.static_kw, "using static power budget");
            Ok(Arc::new(StaticPowerSource(power.static_kw)))
        }
    }
}

fn alert_sink(config: &PowerCycleConfig) -> anyhow::Result<Arc<dyn AlertSink>> {
    let log: Arc<dyn AlertSink> = Arc::new(LogAlertSink);
    let mut sinks = FanoutAlertSink::new(vec![log]);
    if let Some(url) = &config.alerts.webhook_url {
        let timeout: Duration = duration("alerts.timeout", &config.alerts.timeout)?;
        sinks.push(Arc::new(WebhookAlertSink::new(url.clone(), timeout)));
        info!(%url, "alert webhook configured");
    }
    Ok(Arc::new(sinks))
}

fn connectivity(config: &PowerCycleConfig) -> anyhow::Result<Option<Arc<dyn ConnectivityCheck>>> {
    let network = &config.network;
    let Some(url) = &network.check_url else {
        return Ok(None);
    };
    let timeout = duration("network.timeout", &network.timeout)?;
    let check: Arc<dyn ConnectivityCheck> =
        Arc::new(HttpConnectivityCheck::new(url.clone(), timeout));
    info!(%url, "upstream connectivity check configured");

    match FallbackPool::from_command(check.clone(), &network.fallback_pool_command) {
        Some(pool) => {
            info!(command = ?network.fallback_pool_command, "fallback pool configured");
            let pool: Arc<dyn ConnectivityCheck> = Arc::new(pool);
            Ok(Some(pool))
        }
        None => Ok(Some(check)),
    }
}
