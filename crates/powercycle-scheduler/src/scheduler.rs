//! CyclingScheduler — executes one scheduling pass.
//!
//! A pass reads the ledger once and allocates slots against that fixed
//! snapshot. Activations go out in waves with bounded concurrency; a
//! refused activation hands its slot to the next device in fairness
//! order on the following wave. Deactivations for everything left over
//! go out last. The results are then folded back in fairness order on a
//! single task so the cache, the ledger, and the active counter are only
//! touched by accepted commands.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use powercycle_core::{
    Command, CommandError, DeviceCommandPort, DeviceOutcome, DeviceTickOutcome, SchedulerSettings,
    SchedulingContext, TickOutcome,
};
use powercycle_ledger::DeviceLedger;

use crate::budget;
use crate::cache::CommandCache;
use crate::error::SchedulerResult;
use crate::planner::{Decision, TickPlan};

/// Orchestrates scheduling passes over the ledger, cache, and device port.
#[derive(Clone)]
pub struct CyclingScheduler {
    ledger: Arc<dyn DeviceLedger>,
    cache: CommandCache,
    port: Arc<dyn DeviceCommandPort>,
    command_ttl: Duration,
    command_timeout: Duration,
    max_in_flight: usize,
}

impl CyclingScheduler {
    pub fn new(
        ledger: Arc<dyn DeviceLedger>,
        cache: CommandCache,
        port: Arc<dyn DeviceCommandPort>,
        settings: &SchedulerSettings,
    ) -> Self {
        Self {
            ledger,
            cache,
            port,
            command_ttl: settings.command_ttl,
            command_timeout: settings.command_timeout,
            max_in_flight: settings.max_in_flight.max(1),
        }
    }

    pub fn cache(&self) -> &CommandCache {
        &self.cache
    }

    /// Run one scheduling pass.
    ///
    /// Only a failure to read the ledger aborts the pass; command and
    /// ledger-write failures are recorded per device.
    pub async fn run_tick(&self, ctx: &SchedulingContext) -> SchedulerResult<TickOutcome> {
        self.cache.purge_expired().await;

        let devices = self.ledger.list_ordered_by_fairness()?;
        let device_count = devices.len();
        let max_active = budget::max_active(ctx.available_power_kw, ctx.unit_power, device_count);
        let cached = self
            .cache
            .get_many(devices.iter().map(|d| d.id.as_str()))
            .await;
        let mut plan = TickPlan::new(devices, cached, max_active, ctx.stability_ok);
        let mut results: Vec<Option<Result<(), CommandError>>> = vec![None; device_count];

        let mut waves = 0usize;
        loop {
            let wave = plan.next_activations();
            if wave.is_empty() {
                break;
            }
            waves += 1;
            let answered = self.dispatch(&plan, &wave, Command::Activate).await;
            for (index, result) in answered {
                plan.record_activation(index, result.is_ok());
                results[index] = Some(result);
            }
        }
        let wave = plan.deactivations();
        let answered = self.dispatch(&plan, &wave, Command::Deactivate).await;
        for (index, result) in answered {
            results[index] = Some(result);
        }

        debug!(
            devices = device_count,
            max_active,
            stability_ok = ctx.stability_ok,
            activation_waves = waves,
            issued = plan.issued().count(),
            "tick commands dispatched"
        );

        let mut outcome = TickOutcome {
            device_count,
            max_active,
            ..TickOutcome::default()
        };

        for (planned, result) in plan.devices().iter().zip(results) {
            let Some(decision) = planned.decision else {
                continue;
            };
            let id = planned.id();
            let device_outcome = match (decision, result) {
                (Decision::Skip(state), _) => {
                    if state.is_active() {
                        outcome.active_count += 1;
                    }
                    debug!(device = %id, %state, "command skipped, cache matches");
                    DeviceOutcome::CommandSkipped(state)
                }
                (Decision::Issue(command), Some(Ok(()))) => {
                    self.cache
                        .set(id, command.target_state(), self.command_ttl)
                        .await;
                    match command {
                        Command::Activate => {
                            outcome.active_count += 1;
                            info!(device = %id, cycles_off = planned.device.cycles_off, "device activated");
                            DeviceOutcome::MarkedActive
                        }
                        Command::Deactivate => {
                            info!(device = %id, "device deactivated");
                            if !self.record_deactivation(id) {
                                outcome.ledger_failures += 1;
                            }
                            DeviceOutcome::MarkedInactive
                        }
                    }
                }
                (Decision::Issue(command), Some(Err(e))) => {
                    error!(device = %id, %command, error = %e, "device command failed");
                    DeviceOutcome::CommandFailed(command)
                }
                (Decision::Issue(command), None) => {
                    error!(device = %id, %command, "device command produced no result");
                    DeviceOutcome::CommandFailed(command)
                }
            };
            outcome.outcomes.push(DeviceTickOutcome {
                device: id.to_string(),
                outcome: device_outcome,
            });
        }

        debug_assert_eq!(outcome.active_count, plan.active());
        debug_assert!(outcome.active_count <= max_active);
        Ok(outcome)
    }

    /// Send `command` to every device in `wave`, at most `max_in_flight`
    /// at a time.
    ///
    /// Returns one `(index, result)` per wave entry; a task that panicked
    /// or was aborted reports a transport error.
    async fn dispatch(
        &self,
        plan: &TickPlan,
        wave: &[usize],
        command: Command,
    ) -> Vec<(usize, Result<(), CommandError>)> {
        let mut results: Vec<(usize, Result<(), CommandError>)> = wave
            .iter()
            .map(|&index| {
                (
                    index,
                    Err(CommandError::Transport(
                        "command task did not complete".to_string(),
                    )),
                )
            })
            .collect();
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        for (slot, &index) in wave.iter().enumerate() {
            let port = Arc::clone(&self.port);
            let permits = Arc::clone(&permits);
            let id = plan.device(index).device.id.clone();
            let timeout = self.command_timeout;
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let call = async {
                    match command {
                        Command::Activate => port.activate(&id).await,
                        Command::Deactivate => port.deactivate(&id).await,
                    }
                };
                let result = match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(CommandError::Timeout(timeout)),
                };
                (slot, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, result)) => results[slot].1 = result,
                Err(e) => warn!(error = %e, "device command task failed to complete"),
            }
        }

        results
    }

    /// Write a deactivation to the ledger, retrying once.
    ///
    /// Returns false if the row could not be updated; the command itself
    /// was already accepted by the device.
    fn record_deactivation(&self, id: &str) -> bool {
        let first = match self.ledger.record_deactivation(id) {
            Ok(_) => return true,
            Err(e) => e,
        };
        warn!(device = %id, error = %first, "ledger write failed, retrying");
        match self.ledger.record_deactivation(id) {
            Ok(_) => true,
            Err(e) => {
                error!(
                    device = %id,
                    error = %e,
                    "ledger write failed after retry, cycle count for this deactivation is lost"
                );
                false
            }
        }
    }
}
