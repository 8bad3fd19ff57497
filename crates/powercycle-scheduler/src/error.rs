//! Scheduler error types.

use thiserror::Error;

/// Errors that abort a whole scheduling pass.
///
/// Per-device command failures and ledger write failures never surface
/// here; they are recorded in the tick outcome.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("ledger error: {0}")]
    Ledger(#[from] powercycle_ledger::LedgerError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
