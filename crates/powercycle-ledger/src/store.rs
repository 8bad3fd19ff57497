//! RedbLedger — redb-backed persistence for the device ledger.
//!
//! Rows are JSON-serialized into redb's `&[u8]` value column. The ledger
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use powercycle_core::{Clock, SystemClock};

use crate::DeviceLedger;
use crate::error::{LedgerError, LedgerResult};
use crate::tables::DEVICES;
use crate::types::{Device, sort_by_fairness};

/// Convert any `Display` error into a `LedgerError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| LedgerError::$variant(e.to_string())
    };
}

/// Thread-safe device ledger backed by redb.
#[derive(Clone)]
pub struct RedbLedger {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl RedbLedger {
    /// Open (or create) a persistent ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let ledger = Self::from_database(db)?;
        debug!(?path, "device ledger opened");
        Ok(ledger)
    }

    /// Create an ephemeral in-memory ledger (for testing).
    pub fn open_in_memory() -> LedgerResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let ledger = Self::from_database(db)?;
        debug!("in-memory device ledger opened");
        Ok(ledger)
    }

    /// Replace the clock used to stamp `last_off`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn from_database(db: Database) -> LedgerResult<Self> {
        let ledger = Self {
            db: Arc::new(db),
            clock: Arc::new(SystemClock),
        };
        ledger.ensure_tables()?;
        Ok(ledger)
    }

    /// Create the devices table if it doesn't exist yet.
    fn ensure_tables(&self) -> LedgerResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(DEVICES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Number of devices in the ledger.
    pub fn len(&self) -> LedgerResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
        let mut count = 0;
        for entry in table.iter().map_err(map_err!(Read))? {
            entry.map_err(map_err!(Read))?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl DeviceLedger for RedbLedger {
    fn list_ordered_by_fairness(&self) -> LedgerResult<Vec<Device>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
        let mut devices = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let device: Device =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            devices.push(device);
        }
        sort_by_fairness(&mut devices);
        Ok(devices)
    }

    fn record_deactivation(&self, id: &str) -> LedgerResult<Device> {
        let now = self.clock.now();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let device = {
            let mut table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
            let existing: Option<Device> = match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            let mut device = existing.unwrap_or_else(|| Device::new(id));
            device.record_deactivation(now);
            let value = serde_json::to_vec(&device).map_err(map_err!(Serialize))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            device
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(device = %id, cycles_off = device.cycles_off, "deactivation recorded");
        Ok(device)
    }

    fn record_observed_if_absent(&self, id: &str) -> LedgerResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let created = {
            let mut table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
            let exists = table.get(id).map_err(map_err!(Read))?.is_some();
            if !exists {
                let value = serde_json::to_vec(&Device::new(id)).map_err(map_err!(Serialize))?;
                table
                    .insert(id, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            !exists
        };
        txn.commit().map_err(map_err!(Transaction))?;
        if created {
            debug!(device = %id, "device registered");
        }
        Ok(created)
    }

    fn get(&self, id: &str) -> LedgerResult<Option<Device>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let device: Device =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(device))
            }
            None => Ok(None),
        }
    }
}
