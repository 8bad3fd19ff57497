//! Device ledger rows and the fairness order.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use powercycle_core::DeviceId;

/// Persisted fair-use record for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Number of accepted deactivations. Never decreases.
    pub cycles_off: u64,
    /// Time of the most recent accepted deactivation.
    pub last_off: Option<DateTime<Utc>>,
}

impl Device {
    /// A device that has never been deactivated.
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            cycles_off: 0,
            last_off: None,
        }
    }

    /// Apply one deactivation at `now`.
    ///
    /// `last_off` never moves backwards, even if the clock does.
    pub fn record_deactivation(&mut self, now: DateTime<Utc>) {
        self.cycles_off = self.cycles_off.saturating_add(1);
        self.last_off = Some(match self.last_off {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }

    /// Fairness order: fewest deactivations first, then longest idle
    /// (`None` sorts before any timestamp), then id.
    pub fn fairness_cmp(&self, other: &Self) -> Ordering {
        self.cycles_off
            .cmp(&other.cycles_off)
            .then_with(|| self.last_off.cmp(&other.last_off))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sort devices into fairness order in place.
pub fn sort_by_fairness(devices: &mut [Device]) {
    devices.sort_by(Device::fairness_cmp);
}
