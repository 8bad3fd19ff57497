//! Available supply power sources.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use powercycle_core::PowerAvailabilitySource;

use crate::client;

/// Body returned by the site power meter.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MeterReading {
    /// Amperes.
    pub current: f64,
    /// Volts.
    pub voltage: f64,
}

impl MeterReading {
    pub fn kw(&self) -> f64 {
        self.current * self.voltage / 1000.0
    }
}

/// Polls an HTTP meter returning `{"current": A, "voltage": V}`.
#[derive(Debug, Clone)]
pub struct HttpPowerMeter {
    url: String,
    fallback_kw: f64,
    timeout: Duration,
}

impl HttpPowerMeter {
    pub fn new(url: impl Into<String>, fallback_kw: f64, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            fallback_kw,
            timeout,
        }
    }

    async fn read_meter(&self) -> Result<MeterReading, String> {
        let resp = client::get(&self.url, self.timeout)
            .await
            .map_err(|e| e.to_string())?;
        if !resp.is_success() {
            return Err(format!("meter returned {}", resp.status));
        }
        serde_json::from_slice(&resp.body).map_err(|e| format!("malformed meter body: {e}"))
    }
}

#[async_trait]
impl PowerAvailabilitySource for HttpPowerMeter {
    async fn read(&self) -> f64 {
        match self.read_meter().await {
            Ok(reading) => {
                let kw = reading.kw();
                if kw.is_finite() && kw >= 0.0 {
                    debug!(current = reading.current, voltage = reading.voltage, kw, "power meter read");
                    kw
                } else {
                    warn!(kw, fallback = self.fallback_kw, "power meter returned an unusable value");
                    self.fallback_kw
                }
            }
            Err(reason) => {
                warn!(url = %self.url, %reason, fallback = self.fallback_kw, "power meter read failed");
                self.fallback_kw
            }
        }
    }
}

/// Fixed supply, for sites with a contracted budget and no meter.
#[derive(Debug, Clone, Copy)]
pub struct StaticPowerSource(pub f64);

#[async_trait]
impl PowerAvailabilitySource for StaticPowerSource {
    async fn read(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;

    use crate::client::test_server;

    async fn meter(body: &'static str) -> String {
        let router = Router::new().route(
            "/power",
            get(move || async move {
                ([(axum::http::header::CONTENT_TYPE, "application/json")], body)
            }),
        );
        let addr = test_server::spawn(router).await;
        format!("http://{addr}/power")
    }

    #[test]
    fn kw_is_amps_times_volts() {
        let reading = MeterReading {
            current: 100.0,
            voltage: 400.0,
        };
        assert_eq!(reading.kw(), 40.0);
    }

    #[tokio::test]
    async fn reads_meter_json() {
        let url = meter(r#"{"current": 50.0, "voltage": 230.0}"#).await;
        let source = HttpPowerMeter::new(url, 0.0, Duration::from_secs(2));
        assert_eq!(source.read().await, 11.5);
    }

    #[tokio::test]
    async fn malformed_body_falls_back() {
        let url = meter(r#"{"amps": 50}"#).await;
        let source = HttpPowerMeter::new(url, 7.0, Duration::from_secs(2));
        assert_eq!(source.read().await, 7.0);
    }

    #[tokio::test]
    async fn negative_power_falls_back() {
        let url = meter(r#"{"current": -10.0, "voltage": 230.0}"#).await;
        let source = HttpPowerMeter::new(url, 0.0, Duration::from_secs(2));
        assert_eq!(source.read().await, 0.0);
    }

    #[tokio::test]
    async fn unreachable_meter_falls_back() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = HttpPowerMeter::new(format!("http://{addr}/power"), 0.0, Duration::from_secs(1));
        assert_eq!(source.read().await, 0.0);
    }

    #[tokio::test]
    async fn static_source_is_constant() {
        let source = StaticPowerSource(120.0);
        assert_eq!(source.read().await, 120.0);
        assert_eq!(source.read().await, 120.0);
    }
}
