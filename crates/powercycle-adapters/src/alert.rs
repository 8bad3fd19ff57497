//! Alert sinks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use powercycle_core::{AlertError, AlertSink};

use crate::client;

/// POSTs `{"message": ...}` to a webhook (SMS gateway, chat bridge, ...).
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    url: String,
    timeout: Duration,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, message: &str) -> Result<(), AlertError> {
        let body = serde_json::json!({ "message": message });
        let resp = client::post_json(&self.url, &body, self.timeout)
            .await
            .map_err(|e| AlertError::Delivery(e.to_string()))?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(AlertError::Rejected {
                status: resp.status.as_u16(),
            })
        }
    }
}

/// Writes alerts to the log. Always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, message: &str) -> Result<(), AlertError> {
        warn!(target: "powercycle::alert", %message, "ALERT");
        Ok(())
    }
}

/// Delivers to every inner sink; reports the first failure after all
/// sinks have been tried.
#[derive(Clone, Default)]
pub struct FanoutAlertSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutAlertSink {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl AlertSink for FanoutAlertSink {
    async fn send(&self, message: &str) -> Result<(), AlertError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.send(message).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
