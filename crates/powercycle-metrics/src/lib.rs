//! powercycle-metrics — observability for the cycling scheduler.
//!
//! # Architecture
//!
//! ```text
//! TickMetrics (MetricsSink)
//!   ├── record_tick() ← called by the TickDriver once per pass
//!   └── snapshot() → latest TickReport + cumulative counters
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{MetricsSnapshot, TickMetrics};
pub use prometheus::render_prometheus;
