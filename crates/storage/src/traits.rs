use serde::{Deserialize, Serialize};

use stocktrail_core::{ChangeRecord, OperatingMode, Product};

use crate::error::StorageError;

/// Snapshot of everything a session keeps in memory: the product list and
/// the flat history-record list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub history: Vec<ChangeRecord>,
}

/// Durable mirror of session state, keyed by operating mode.
///
/// Local mode writes through this after every mutation; connected mode uses
/// it only as a best-effort cache. Each mode has its own namespace, so
/// connected-cache data and local-sandbox data never collide.
pub trait Mirror {
    /// `None` means the namespace holds no readable snapshot — either
    /// nothing was ever saved or the stored product blob is unparseable.
    /// Corruption is absorbed here, never surfaced as an error.
    fn load(&self, mode: OperatingMode) -> Result<Option<StoredState>, StorageError>;

    fn save(&mut self, mode: OperatingMode, state: &StoredState) -> Result<(), StorageError>;
}
