//! powercycle-scheduler — the power-constrained cycling scheduler.
//!
//! Decides, once per tick, which devices run and which are idled so the
//! fleet stays inside the supply budget and respects the grid stability
//! signal.
//!
//! # Architecture
//!
//! ```text
//! TickDriver (periodic, non-overlapping)
//!   ├── StabilitySignalSource / PowerAvailabilitySource → SchedulingContext
//!   ├── ConnectivityCheck (optional)                  → TickReport::network_up
//!   ├── CyclingScheduler::run_tick()
//!   │   ├── DeviceLedger::list_ordered_by_fairness()   (snapshot, once)
//!   │   ├── budget::max_active()
//!   │   ├── CommandCache lookups
//!   │   ├── TickPlan                                   (pure slot allocation)
//!   │   ├── DeviceCommandPort calls                    (waves, bounded concurrency)
//!   │   └── reducer: cache / ledger / active counter
//!   ├── MetricsSink::record_tick()
//!   └── AlertPolicy → AlertSink
//! ```
//!
//! # Invariants
//!
//! - At most `max_active` devices are active after a tick, and none when
//!   the stability signal is not OK.
//! - A failed command updates neither the cache nor the ledger.
//! - `cycles_off` only grows.

pub mod alerts;
pub mod budget;
pub mod cache;
pub mod driver;
pub mod error;
pub mod planner;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use alerts::AlertPolicy;
pub use budget::max_active;
pub use cache::{CachedCommand, CommandCache};
pub use driver::TickDriver;
pub use error::{SchedulerError, SchedulerResult};
pub use planner::{Decision, PlannedDevice, TickPlan};
pub use scheduler::CyclingScheduler;
