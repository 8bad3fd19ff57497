//! redb table definitions for the device ledger.

use redb::TableDefinition;

/// Device rows keyed by device id, JSON-serialized [`Device`](crate::Device) values.
pub const DEVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("devices");
