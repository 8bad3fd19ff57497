//! Scripted collaborators shared by the scheduler and driver tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use powercycle_core::{
    AlertError, AlertSink, Command, CommandError, ConnectivityCheck, DeviceCommandPort,
    MetricsSink, PowerAvailabilitySource, StabilityReading, StabilitySignalSource, TickReport,
};
use powercycle_ledger::{Device, DeviceLedger, LedgerError, LedgerResult, RedbLedger};

/// Device port that records every call and fails on request.
#[derive(Default)]
pub struct FakePort {
    calls: Mutex<Vec<(String, Command)>>,
    failing: Mutex<HashSet<(String, Command)>>,
    hanging: Mutex<HashSet<String>>,
}

impl FakePort {
    pub fn fail(&self, id: &str, command: Command) {
        self.failing.lock().unwrap().insert((id.to_string(), command));
    }

    pub fn hang(&self, id: &str) {
        self.hanging.lock().unwrap().insert(id.to_string());
    }

    pub fn calls(&self) -> Vec<(String, Command)> {
        self.calls.lock().unwrap().clone()
    }

    /// Ids that received `command`, sorted.
    pub fn calls_for(&self, command: Command) -> Vec<String> {
        let mut ids: Vec<String> = self
            .calls()
            .into_iter()
            .filter(|(_, c)| *c == command)
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn call(&self, id: &str, command: Command) -> Result<(), CommandError> {
        self.calls.lock().unwrap().push((id.to_string(), command));
        let hang = self.hanging.lock().unwrap().contains(id);
        if hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        let fail = self
            .failing
            .lock()
            .unwrap()
            .contains(&(id.to_string(), command));
        if fail {
            Err(CommandError::Rejected { status: 500 })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeviceCommandPort for FakePort {
    async fn activate(&self, id: &str) -> Result<(), CommandError> {
        self.call(id, Command::Activate).await
    }

    async fn deactivate(&self, id: &str) -> Result<(), CommandError> {
        self.call(id, Command::Deactivate).await
    }
}

/// Ledger whose deactivation writes fail a scripted number of times.
pub struct FlakyLedger {
    pub inner: RedbLedger,
    pub write_failures: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(inner: RedbLedger, write_failures: usize) -> Self {
        Self {
            inner,
            write_failures: AtomicUsize::new(write_failures),
        }
    }
}

impl DeviceLedger for FlakyLedger {
    fn list_ordered_by_fairness(&self) -> LedgerResult<Vec<Device>> {
        self.inner.list_ordered_by_fairness()
    }

    fn record_deactivation(&self, id: &str) -> LedgerResult<Device> {
        let remaining = self.write_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.write_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(LedgerError::Write("disk full".to_string()));
        }
        self.inner.record_deactivation(id)
    }

    fn record_observed_if_absent(&self, id: &str) -> LedgerResult<bool> {
        self.inner.record_observed_if_absent(id)
    }

    fn get(&self, id: &str) -> LedgerResult<Option<Device>> {
        self.inner.get(id)
    }
}

/// Stability source returning whatever was last set.
pub struct FixedStability(pub Mutex<StabilityReading>);

impl FixedStability {
    pub fn new(value: f64, ok: bool) -> Self {
        Self(Mutex::new(StabilityReading { value, ok }))
    }

    pub fn set(&self, value: f64, ok: bool) {
        *self.0.lock().unwrap() = StabilityReading { value, ok };
    }
}

#[async_trait]
impl StabilitySignalSource for FixedStability {
    async fn read(&self) -> StabilityReading {
        *self.0.lock().unwrap()
    }
}

/// Power source returning whatever was last set.
pub struct FixedPower(pub Mutex<f64>);

impl FixedPower {
    pub fn new(kw: f64) -> Self {
        Self(Mutex::new(kw))
    }

    pub fn set(&self, kw: f64) {
        *self.0.lock().unwrap() = kw;
    }
}

#[async_trait]
impl PowerAvailabilitySource for FixedPower {
    async fn read(&self) -> f64 {
        *self.0.lock().unwrap()
    }
}

/// Connectivity check returning whatever was last set.
pub struct FixedConnectivity(pub std::sync::atomic::AtomicBool);

impl FixedConnectivity {
    pub fn new(up: bool) -> Self {
        Self(std::sync::atomic::AtomicBool::new(up))
    }

    pub fn set(&self, up: bool) {
        self.0.store(up, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityCheck for FixedConnectivity {
    async fn is_up(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingMetrics(pub Mutex<Vec<TickReport>>);

#[async_trait]
impl MetricsSink for RecordingMetrics {
    async fn record_tick(&self, report: &TickReport) {
        self.0.lock().unwrap().push(report.clone());
    }
}

/// Alert sink that records messages and can be told to fail.
#[derive(Default)]
pub struct RecordingAlerts {
    pub messages: Mutex<Vec<String>>,
    pub broken: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn send(&self, message: &str) -> Result<(), AlertError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(AlertError::Delivery("sms gateway down".to_string()));
        }
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// One log event as seen by [`capture_events`].
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub device: Option<String>,
}

#[derive(Default)]
struct EventFields {
    message: String,
    device: Option<String>,
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "device" => self.device = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

struct CaptureLayer(Arc<Mutex<Vec<CapturedEvent>>>);

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = EventFields::default();
        event.record(&mut fields);
        self.0.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: fields.message,
            device: fields.device,
        });
    }
}

/// A subscriber that keeps every event it sees, for asserting on logs.
pub fn capture_events() -> (
    impl Subscriber + Send + Sync + 'static,
    Arc<Mutex<Vec<CapturedEvent>>>,
) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(CaptureLayer(Arc::clone(&events)));
    (subscriber, events)
}
