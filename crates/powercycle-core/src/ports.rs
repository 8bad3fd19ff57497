//! Narrow interfaces the scheduler uses to reach the outside world.
//!
//! Concrete implementations live in `powercycle-adapters` and
//! `powercycle-metrics`; tests substitute scripted fakes.

use async_trait::async_trait;

use crate::error::{AlertError, CommandError};
use crate::types::{StabilityReading, TickReport};

/// Outbound device control (e.g. a mining-rig management API).
///
/// Implementations should bound their own network time; the scheduler
/// additionally wraps every call in its command timeout.
#[async_trait]
pub trait DeviceCommandPort: Send + Sync {
    async fn activate(&self, id: &str) -> Result<(), CommandError>;
    async fn deactivate(&self, id: &str) -> Result<(), CommandError>;
}

/// The external stability signal (grid frequency).
///
/// Read failures are absorbed by the implementation, which returns its
/// configured fallback with `ok = false`.
#[async_trait]
pub trait StabilitySignalSource: Send + Sync {
    async fn read(&self) -> StabilityReading;
}

/// Currently available supply power, in kW.
///
/// Read failures are absorbed by the implementation, which returns its
/// configured fallback (zero by default).
#[async_trait]
pub trait PowerAvailabilitySource: Send + Sync {
    async fn read(&self) -> f64;
}

/// Upstream (mining pool) reachability, checked once per tick.
///
/// Failures are absorbed: an unreachable upstream is simply `false`.
#[async_trait]
pub trait ConnectivityCheck: Send + Sync {
    async fn is_up(&self) -> bool;
}

/// Receives one report per completed tick.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_tick(&self, report: &TickReport);
}

/// Delivers human-readable alert messages.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), AlertError>;
}
