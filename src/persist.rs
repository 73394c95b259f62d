//! # Persistence gateway
//! This module contains the durable-store collaborator interface and the
//! boot-time load of the alarm table.
//!
//! The table is stored as one opaque blob holding the canonical JSON
//! document. A save is all-or-nothing; an absent blob is equivalent to an
//! empty, disabled table.

use crate::schedule::{TABLE_JSON_MAX, WeeklyAlarmTable};

/// The durable-store collaborator.
///
/// `load` is called exactly once, at startup; `save` after every table
/// mutation and every enable/disable transition.
#[allow(async_fn_in_trait)]
pub trait PersistenceGateway {
    /// Error reported by a failed save
    type Error: core::fmt::Debug;

    /// Read the previously saved blob into `buf` and return the number of
    /// bytes read. `None` if nothing was saved yet or the storage is
    /// unavailable.
    async fn load(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Store the blob, replacing any previous one
    async fn save(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Result of loading the table at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoadedTable {
    /// The loaded table, empty and disabled if nothing usable was stored
    pub table: WeeklyAlarmTable,
    /// True when a stored blob existed but could not be parsed and the
    /// empty table was substituted to preserve availability
    pub recovered: bool,
}

/// Loads the alarm table from the durable store.
///
/// An absent blob yields an empty, disabled table. A malformed blob also
/// yields an empty, disabled table, but flags the substitution so the
/// caller can surface it.
pub async fn load_table<P: PersistenceGateway>(store: &mut P) -> LoadedTable {
    let mut buf = [0u8; TABLE_JSON_MAX];

    let Some(len) = store.load(&mut buf).await else {
        #[cfg(feature = "defmt")]
        defmt::info!("No persisted alarm table, starting empty");
        return LoadedTable {
            table: WeeklyAlarmTable::new_empty(),
            recovered: false,
        };
    };

    let Some(bytes) = buf.get(..len) else {
        #[cfg(feature = "defmt")]
        defmt::warn!("Persisted alarm table larger than its bound, starting empty");
        return LoadedTable {
            table: WeeklyAlarmTable::new_empty(),
            recovered: true,
        };
    };

    match WeeklyAlarmTable::from_json(bytes) {
        Ok(table) => LoadedTable {
            table,
            recovered: false,
        },
        Err(_e) => {
            #[cfg(feature = "defmt")]
            defmt::warn!("Persisted alarm table is malformed, starting empty");
            LoadedTable {
                table: WeeklyAlarmTable::new_empty(),
                recovered: true,
            }
        }
    }
}
