use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use stocktrail_core::{ChangeRecord, OperatingMode, Product};

use crate::error::StorageError;
use crate::traits::{Mirror, StoredState};

const PRODUCTS_KEY: &str = "products";
const HISTORY_KEY: &str = "history";

pub struct SqliteMirror {
    conn: Connection,
}

impl SqliteMirror {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM mirror WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }
}

impl Mirror for SqliteMirror {
    fn load(&self, mode: OperatingMode) -> Result<Option<StoredState>, StorageError> {
        let namespace = mode.namespace();

        let products: Vec<Product> = match self.get(namespace, PRODUCTS_KEY)? {
            None => return Ok(None),
            Some(blob) => match serde_json::from_str(&blob) {
                Ok(products) => products,
                Err(e) => {
                    // Unparseable snapshot is treated as absent; local mode
                    // reseeds, connected mode starts from an empty cache.
                    warn!(namespace, error = %e, "discarding unreadable product snapshot");
                    return Ok(None);
                }
            },
        };

        let history: Vec<ChangeRecord> = match self.get(namespace, HISTORY_KEY)? {
            None => Vec::new(),
            Some(blob) => match serde_json::from_str(&blob) {
                Ok(history) => history,
                Err(e) => {
                    warn!(namespace, error = %e, "discarding unreadable history snapshot");
                    Vec::new()
                }
            },
        };

        Ok(Some(StoredState { products, history }))
    }

    fn save(&mut self, mode: OperatingMode, state: &StoredState) -> Result<(), StorageError> {
        let namespace = mode.namespace();
        let products = serde_json::to_string(&state.products)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let history = serde_json::to_string(&state.history)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tx = self.conn.transaction()?;
        for (key, value) in [(PRODUCTS_KEY, &products), (HISTORY_KEY, &history)] {
            tx.execute(
                "INSERT INTO mirror (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, unixepoch())
                 ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![namespace, key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
