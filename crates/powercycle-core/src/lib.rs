//! powercycle-core — shared vocabulary for the power-constrained cycling
//! scheduler.
//!
//! Holds the value types that flow between the scheduler and its
//! collaborators, the collaborator port traits themselves, the clock
//! abstraction, and `powercycle.toml` configuration parsing.

pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod ports;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PowerCycleConfig, SchedulerSettings};
pub use error::{AlertError, CommandError, ConfigError, ConfigResult};
pub use ports::{
    AlertSink, ConnectivityCheck, DeviceCommandPort, MetricsSink, PowerAvailabilitySource,
    StabilitySignalSource,
};
pub use types::*;
