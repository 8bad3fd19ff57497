//! Upstream connectivity and the local fallback pool.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use powercycle_core::ConnectivityCheck;

use crate::client;

/// Reachability of an upstream HTTP endpoint.
///
/// Any response counts as up, whatever its status; only connect errors
/// and timeouts count as down.
#[derive(Debug, Clone)]
pub struct HttpConnectivityCheck {
    url: String,
    timeout: Duration,
}

impl HttpConnectivityCheck {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ConnectivityCheck for HttpConnectivityCheck {
    async fn is_up(&self) -> bool {
        match client::get(&self.url, self.timeout).await {
            Ok(resp) => {
                debug!(url = %self.url, status = %resp.status, "upstream reachable");
                true
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "upstream unreachable");
                false
            }
        }
    }
}

/// Wraps a connectivity check and keeps a local pool server running
/// while the upstream is down.
///
/// The process is started on the first failed check, restarted if it has
/// exited by the next failed check, and killed once the upstream answers
/// again.
pub struct FallbackPool {
    check: Arc<dyn ConnectivityCheck>,
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl FallbackPool {
    pub fn new(
        check: Arc<dyn ConnectivityCheck>,
        program: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            check,
            program: program.into(),
            args,
            child: Mutex::new(None),
        }
    }

    /// Build from a `[program, args...]` list; `None` when it is empty.
    pub fn from_command(check: Arc<dyn ConnectivityCheck>, command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(check, program.clone(), args.to_vec()))
    }

    pub async fn is_running(&self) -> bool {
        let mut slot = self.child.lock().await;
        matches!(slot.as_mut().map(|c| c.try_wait()), Some(Ok(None)))
    }

    async fn ensure_started(&self) {
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.as_mut() {
            match child.try_wait() {
                Ok(None) => return,
                Ok(Some(status)) => warn!(program = %self.program, %status, "fallback pool exited"),
                Err(e) => warn!(program = %self.program, error = %e, "fallback pool status unknown"),
            }
        }

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        *slot = match spawned {
            Ok(child) => {
                warn!(program = %self.program, pid = child.id(), "upstream down, fallback pool started");
                Some(child)
            }
            Err(e) => {
                error!(program = %self.program, error = %e, "fallback pool failed to start");
                None
            }
        };
    }

    async fn stop(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        match child.kill().await {
            Ok(()) => info!(program = %self.program, "upstream reachable again, fallback pool stopped"),
            Err(e) => warn!(program = %self.program, error = %e, "fallback pool could not be stopped"),
        }
    }
}

#[async_trait]
impl ConnectivityCheck for FallbackPool {
    async fn is_up(&self) -> bool {
        let up = self.check.is_up().await;
        if up {
            self.stop().await;
        } else {
            self.ensure_started().await;
        }
        up
    }
}
