//! Rig-control HTTP API device port.
//!
//! `GET {base}/start?asic={id}` activates a device and
//! `GET {base}/stop?asic={id}` deactivates it. Any 2xx is success.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use powercycle_core::{Command, CommandError, DeviceCommandPort, is_valid_device_id};

use crate::client::{self, HttpError};

#[derive(Debug, Clone)]
pub struct HttpRigPort {
    base_url: String,
    timeout: Duration,
}

impl HttpRigPort {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, timeout }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn command_url(&self, id: &str, command: Command) -> String {
        let action = match command {
            Command::Activate => "start",
            Command::Deactivate => "stop",
        };
        format!("{}/{action}?asic={id}", self.base_url)
    }

    async fn call(&self, id: &str, command: Command) -> Result<(), CommandError> {
        // Ids go into the query string unescaped.
        if !is_valid_device_id(id) {
            return Err(CommandError::Transport(format!("invalid device id `{id}`")));
        }

        let url = self.command_url(id, command);
        let resp = client::get(&url, self.timeout)
            .await
            .map_err(|e| match e {
                HttpError::Timeout(d) => CommandError::Timeout(d),
                other => CommandError::Transport(other.to_string()),
            })?;

        if resp.is_success() {
            debug!(device = %id, %command, "rig accepted command");
            Ok(())
        } else {
            Err(CommandError::Rejected {
                status: resp.status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl DeviceCommandPort for HttpRigPort {
    async fn activate(&self, id: &str) -> Result<(), CommandError> {
        self.call(id, Command::Activate).await
    }

    async fn deactivate(&self, id: &str) -> Result<(), CommandError> {
        self.call(id, Command::Deactivate).await
    }
}
