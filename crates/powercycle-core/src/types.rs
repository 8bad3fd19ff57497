//! Value types exchanged between the scheduler and its collaborators.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Opaque unique identifier of a controllable device.
pub type DeviceId = String;

/// Whether `id` is acceptable as a device identifier.
///
/// Ids travel in query strings and redb keys, so they are limited to
/// ASCII alphanumerics plus `-`, `_` and `.`.
pub fn is_valid_device_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

// ── Commands ───────────────────────────────────────────────────────

/// The last state a device was commanded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Active,
    Inactive,
}

impl CommandState {
    pub fn from_active(active: bool) -> Self {
        if active { Self::Active } else { Self::Inactive }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    /// The command that drives a device into this state.
    pub fn command(self) -> Command {
        match self {
            Self::Active => Command::Activate,
            Self::Inactive => Command::Deactivate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control command sent through the device port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Activate,
    Deactivate,
}

impl Command {
    /// The state a device is in once this command is accepted.
    pub fn target_state(self) -> CommandState {
        match self {
            Self::Activate => CommandState::Active,
            Self::Deactivate => CommandState::Inactive,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Signals and context ────────────────────────────────────────────

/// One reading of the external stability signal (e.g. grid frequency).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityReading {
    pub value: f64,
    /// False when the source could not produce a trustworthy value.
    pub ok: bool,
}

/// Power draw of one active device, in kW. Always positive and finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct UnitPower(f64);

impl UnitPower {
    pub fn new(kw: f64) -> ConfigResult<Self> {
        if kw.is_finite() && kw > 0.0 {
            Ok(Self(kw))
        } else {
            Err(ConfigError::invalid(
                "scheduler.unit_power_kw",
                format!("must be a positive number of kW, got {kw}"),
            ))
        }
    }

    pub fn kw(self) -> f64 {
        self.0
    }
}

/// Per-tick inputs to the scheduler. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SchedulingContext {
    pub available_power_kw: f64,
    pub stability_ok: bool,
    pub unit_power: UnitPower,
}

// ── Tick results ───────────────────────────────────────────────────

/// What happened to one device during a scheduling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DeviceOutcome {
    /// Activation accepted by the device port.
    MarkedActive,
    /// Deactivation accepted by the device port.
    MarkedInactive,
    /// The cached command already matched; nothing was sent.
    CommandSkipped(CommandState),
    /// The device port rejected the command or timed out.
    CommandFailed(Command),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceTickOutcome {
    pub device: DeviceId,
    #[serde(flatten)]
    pub outcome: DeviceOutcome,
}

/// Result of one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickOutcome {
    pub device_count: usize,
    pub max_active: usize,
    /// Devices commanded (or cached) active this tick.
    pub active_count: usize,
    /// Per-device outcomes, in fairness order.
    pub outcomes: Vec<DeviceTickOutcome>,
    /// Deactivations whose ledger update failed even after a retry.
    pub ledger_failures: usize,
}

impl TickOutcome {
    pub fn issued(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                DeviceOutcome::MarkedActive | DeviceOutcome::MarkedInactive
            )
        })
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DeviceOutcome::CommandSkipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DeviceOutcome::CommandFailed(_)))
    }

    pub fn outcome_for(&self, device: &str) -> Option<DeviceOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.device == device)
            .map(|o| o.outcome)
    }

    fn count(&self, pred: impl Fn(&DeviceOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }
}

/// Everything the driver knows about a completed tick. Handed to the
/// metrics sink and served by the status dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub available_power_kw: f64,
    pub stability_value: f64,
    pub stability_ok: bool,
    /// The power budget cannot cover the whole fleet.
    pub supply_shortfall: bool,
    /// Upstream connectivity; `None` when no check is configured.
    pub network_up: Option<bool>,
    pub outcome: TickOutcome,
    /// Alert messages raised during this tick.
    pub alerts: Vec<String>,
}

impl TickReport {
    pub fn active_count(&self) -> usize {
        self.outcome.active_count
    }
}
