//! powercycle-adapters — concrete implementations of the scheduler's ports.
//!
//! - [`HttpRigPort`]: start/stop devices through the rig-control HTTP API.
//! - [`ModbusStabilitySource`]: grid frequency from a Modbus-TCP meter.
//! - [`HttpPowerMeter`] / [`StaticPowerSource`]: available supply power.
//! - [`WebhookAlertSink`], [`LogAlertSink`], [`FanoutAlertSink`]: alerts.
//! - [`HttpConnectivityCheck`] / [`FallbackPool`]: upstream reachability and
//!   the local pool started while it is down.
//!
//! Every network call is bounded by a timeout. Sources never fail: they
//! fall back to a configured value and log the cause.

pub mod alert;
pub mod client;
pub mod modbus;
pub mod network;
pub mod power_meter;
pub mod rig;

pub use alert::{FanoutAlertSink, LogAlertSink, WebhookAlertSink};
pub use client::HttpError;
pub use modbus::{ModbusStabilitySource, decode_frequency};
pub use network::{FallbackPool, HttpConnectivityCheck};
pub use power_meter::{HttpPowerMeter, MeterReading, StaticPowerSource};
pub use rig::HttpRigPort;
