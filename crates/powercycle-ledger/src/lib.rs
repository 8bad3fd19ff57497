//! powercycle-ledger — the persistent fair-use record of every device.
//!
//! Each device row holds its accumulated deactivation count (`cycles_off`)
//! and the time of its most recent deactivation (`last_off`). The
//! scheduler reads the whole ledger once per tick, ordered by fairness,
//! and writes back one row per accepted deactivation.
//!
//! # Storage
//!
//! [`RedbLedger`] keeps rows in a single redb table keyed by device id,
//! JSON-serialized into `&[u8]` values. Every mutation is one write
//! transaction, and redb admits one writer at a time, so concurrent
//! updates to the same row are serialized. Listings run inside a single
//! read transaction and see a consistent snapshot.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{LedgerError, LedgerResult};
pub use store::RedbLedger;
pub use types::{Device, sort_by_fairness};

/// Fair-use record of device cycling.
pub trait DeviceLedger: Send + Sync {
    /// All known devices, ordered by `(cycles_off, last_off, id)` with
    /// never-deactivated devices first among equal counts.
    fn list_ordered_by_fairness(&self) -> LedgerResult<Vec<Device>>;

    /// Increment `cycles_off` and stamp `last_off`, creating the row if
    /// absent. Returns the updated row.
    fn record_deactivation(&self, id: &str) -> LedgerResult<Device>;

    /// Ensure a row exists without touching an existing one. Returns true
    /// if a row was created.
    fn record_observed_if_absent(&self, id: &str) -> LedgerResult<bool>;

    fn get(&self, id: &str) -> LedgerResult<Option<Device>>;
}
