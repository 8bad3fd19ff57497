//! CommandCache — short-lived memory of the last command sent to each device.
//!
//! Lets the scheduler skip re-sending a command the device already
//! accepted. It is not a source of truth: a missing or expired entry
//! means "unknown", and the device gets an explicit command.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use powercycle_core::{Clock, CommandState, DeviceId};

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    state: CommandState,
    expires_at: DateTime<Utc>,
}

/// An unexpired cache entry, as exposed to read paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedCommand {
    pub device: DeviceId,
    pub state: CommandState,
    pub expires_at: DateTime<Utc>,
}

/// Shared, cloneable command cache with per-entry TTL.
#[derive(Clone)]
pub struct CommandCache {
    entries: Arc<RwLock<HashMap<DeviceId, CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl CommandCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Last commanded state, or `None` on miss or expiry.
    pub async fn get(&self, id: &str) -> Option<CommandState> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(id)
            .filter(|e| e.expires_at > now)
            .map(|e| e.state)
    }

    /// Look up several devices under one read lock.
    pub async fn get_many<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<DeviceId, CommandState> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        ids.into_iter()
            .filter_map(|id| {
                entries
                    .get(id)
                    .filter(|e| e.expires_at > now)
                    .map(|e| (id.to_string(), e.state))
            })
            .collect()
    }

    /// Record `state` for `id`, expiring after `ttl`.
    pub async fn set(&self, id: &str, state: CommandState, ttl: Duration) {
        let now = self.clock.now();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut entries = self.entries.write().await;
        entries.insert(id.to_string(), CacheEntry { state, expires_at });
    }

    /// Drop an entry so the next tick re-sends an explicit command.
    pub async fn invalidate(&self, id: &str) -> bool {
        self.entries.write().await.remove(id).is_some()
    }

    /// Remove expired entries. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// All unexpired entries, sorted by device id.
    pub async fn snapshot(&self) -> Vec<CachedCommand> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut out: Vec<CachedCommand> = entries
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(id, e)| CachedCommand {
                device: id.clone(),
                state: e.state,
                expires_at: e.expires_at,
            })
            .collect();
        out.sort_by(|a, b| a.device.cmp(&b.device));
        out
    }
}
