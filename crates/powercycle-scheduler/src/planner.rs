//! The pure decision core of a scheduling pass.
//!
//! A [`TickPlan`] walks the fairness-ordered ledger snapshot once. Slots
//! are handed out in waves: each wave claims the free slots for the next
//! devices in order, and the executor reports back which activations the
//! devices accepted. A refused activation frees its slot for the next
//! wave, so the budget is filled from the same snapshot rather than left
//! idle until the next tick. Whatever is left once the budget is filled
//! (or the fleet exhausted) is desired inactive. No I/O happens here.

use std::collections::HashMap;

use powercycle_core::{Command, CommandState, DeviceId};
use powercycle_ledger::Device;

/// What to do with one device this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Cached state already matches; send nothing.
    Skip(CommandState),
    /// Send this command through the device port.
    Issue(Command),
}

impl Decision {
    pub fn desired(self) -> CommandState {
        match self {
            Decision::Skip(state) => state,
            Decision::Issue(command) => command.target_state(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDevice {
    pub device: Device,
    /// `None` until the walk reaches this device.
    pub decision: Option<Decision>,
}

impl PlannedDevice {
    pub fn id(&self) -> &str {
        &self.device.id
    }
}

/// Slot allocation state for one pass, in fairness order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickPlan {
    max_active: usize,
    stability_ok: bool,
    devices: Vec<PlannedDevice>,
    cached: HashMap<DeviceId, CommandState>,
    /// First device not yet offered a slot.
    next: usize,
    /// Cached-active skips plus accepted activations.
    active: usize,
    /// Activations handed out whose result is not yet recorded.
    pending: usize,
}

impl TickPlan {
    pub fn new(
        devices: Vec<Device>,
        cached: HashMap<DeviceId, CommandState>,
        max_active: usize,
        stability_ok: bool,
    ) -> Self {
        Self {
            max_active,
            stability_ok,
            devices: devices
                .into_iter()
                .map(|device| PlannedDevice {
                    device,
                    decision: None,
                })
                .collect(),
            cached,
            next: 0,
            active: 0,
            pending: 0,
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Slots held by cached-active skips and accepted activations.
    pub fn active(&self) -> usize {
        self.active
    }

    pub fn devices(&self) -> &[PlannedDevice] {
        &self.devices
    }

    pub fn device(&self, index: usize) -> &PlannedDevice {
        &self.devices[index]
    }

    /// Devices that need a device-port call.
    pub fn issued(&self) -> impl Iterator<Item = (&PlannedDevice, Command)> {
        self.devices.iter().filter_map(|d| match d.decision {
            Some(Decision::Issue(cmd)) => Some((d, cmd)),
            _ => None,
        })
    }

    /// Offer the free slots to the next devices in fairness order.
    ///
    /// A cached-active device takes its slot without a command. Returns the
    /// indices that need an activation; empty once the budget is filled,
    /// the fleet is exhausted, or the stability signal is not OK.
    pub fn next_activations(&mut self) -> Vec<usize> {
        let mut wave = Vec::new();
        if !self.stability_ok {
            return wave;
        }
        while self.next < self.devices.len() && self.active + self.pending < self.max_active {
            let index = self.next;
            self.next += 1;
            let planned = &mut self.devices[index];
            if self.cached.get(&planned.device.id) == Some(&CommandState::Active) {
                planned.decision = Some(Decision::Skip(CommandState::Active));
                self.active += 1;
            } else {
                planned.decision = Some(Decision::Issue(Command::Activate));
                self.pending += 1;
                wave.push(index);
            }
        }
        wave
    }

    /// Record whether the device at `index` accepted its activation.
    pub fn record_activation(&mut self, index: usize, accepted: bool) {
        debug_assert_eq!(
            self.devices[index].decision,
            Some(Decision::Issue(Command::Activate))
        );
        self.pending = self.pending.saturating_sub(1);
        if accepted {
            self.active += 1;
        }
    }

    /// Close slot allocation.
    ///
    /// Every device not offered a slot is desired inactive: skipped when
    /// the cache already says inactive, otherwise deactivated. Returns the
    /// indices that need a deactivation.
    pub fn deactivations(&mut self) -> Vec<usize> {
        let mut wave = Vec::new();
        for index in self.next..self.devices.len() {
            let planned = &mut self.devices[index];
            planned.decision = Some(
                match self.cached.get(&planned.device.id) {
                    Some(CommandState::Inactive) => Decision::Skip(CommandState::Inactive),
                    _ => {
                        wave.push(index);
                        Decision::Issue(Command::Deactivate)
                    }
                },
            );
        }
        self.next = self.devices.len();
        wave
    }
}
