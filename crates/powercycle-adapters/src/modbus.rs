//! Grid frequency from a Modbus-TCP meter.
//!
//! One holding register carries the frequency as an integer scaled by
//! `scale` (5000 → 50.00 Hz at the default scale of 100).

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::prelude::*;
use tracing::{debug, warn};

use powercycle_core::config::{StabilityConfig, duration};
use powercycle_core::{ConfigResult, StabilityReading, StabilitySignalSource};

/// Convert a raw register value to Hz.
pub fn decode_frequency(raw: u16, scale: f64) -> f64 {
    f64::from(raw) / scale
}

#[derive(Debug, Clone)]
pub struct ModbusStabilitySource {
    addr: SocketAddr,
    unit_id: u8,
    register: u16,
    scale: f64,
    fallback_hz: f64,
    timeout: Duration,
}

impl ModbusStabilitySource {
    pub fn new(addr: SocketAddr, fallback_hz: f64) -> Self {
        Self {
            addr,
            unit_id: 1,
            register: 100,
            scale: 100.0,
            fallback_hz,
            timeout: Duration::from_secs(2),
        }
    }

    pub fn from_config(config: &StabilityConfig) -> ConfigResult<Self> {
        Ok(Self {
            addr: config.sensor_socket_addr()?,
            unit_id: config.unit_id,
            register: config.register,
            scale: config.scale,
            fallback_hz: config.fallback_hz,
            timeout: duration("stability.read_timeout", &config.read_timeout)?,
        })
    }

    pub fn with_register(mut self, unit_id: u8, register: u16, scale: f64) -> Self {
        self.unit_id = unit_id;
        self.register = register;
        self.scale = scale;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn fallback(&self) -> StabilityReading {
        StabilityReading {
            value: self.fallback_hz,
            ok: false,
        }
    }

    async fn read_raw(&self) -> io::Result<u16> {
        let mut ctx = tcp::connect_slave(self.addr, Slave(self.unit_id)).await?;
        let words = ctx.read_holding_registers(self.register, 1).await?;
        words
            .first()
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty register response"))
    }
}

#[async_trait]
impl StabilitySignalSource for ModbusStabilitySource {
    async fn read(&self) -> StabilityReading {
        match tokio::time::timeout(self.timeout, self.read_raw()).await {
            Ok(Ok(raw)) => {
                let value = decode_frequency(raw, self.scale);
                debug!(raw, value, "grid frequency read");
                StabilityReading { value, ok: true }
            }
            Ok(Err(e)) => {
                warn!(addr = %self.addr, error = %e, fallback = self.fallback_hz, "grid meter read failed");
                self.fallback()
            }
            Err(_) => {
                warn!(addr = %self.addr, timeout_ms = self.timeout.as_millis() as u64, fallback = self.fallback_hz, "grid meter read timed out");
                self.fallback()
            }
        }
    }
}
