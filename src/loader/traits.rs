//! Catalog store trait and error types

use crate::records::CleanRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Load not found: {0}")]
    LoadNotFound(i64),

    #[error("Record has neither URL nor SKU: {0}")]
    MissingNaturalKey(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Natural key of a catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NaturalKey {
    Url(String),
    Sku(String),
}

impl NaturalKey {
    /// The URL when present, the SKU otherwise
    pub fn of(record: &CleanRecord) -> Option<Self> {
        if !record.url.is_empty() {
            Some(Self::Url(record.url.clone()))
        } else {
            record.sku.clone().map(Self::Sku)
        }
    }
}

/// A catalog entry as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProduct {
    pub id: i64,
    pub record: CleanRecord,
    pub active: bool,
    pub superseded_by: Option<String>,
    pub first_load: i64,
    pub last_load: i64,
}

/// Persistence for the clean catalog
///
/// Used only by the loader and the refresher. Entries are never deleted;
/// superseded entries are marked inactive.
pub trait CatalogStore {
    /// Opens a load and returns its ID
    fn begin_load(&mut self, config_hash: &str) -> StoreResult<i64>;

    /// Marks a load as completed and makes its writes durable
    fn complete_load(&mut self, load_id: i64) -> StoreResult<()>;

    /// Inserts a record or updates the entry with the same natural key
    ///
    /// Returns the entry ID. An updated entry becomes active again.
    fn upsert(&mut self, load_id: i64, record: &CleanRecord) -> StoreResult<i64>;

    fn find_by_natural_key(&self, key: &NaturalKey) -> StoreResult<Option<StoredProduct>>;

    /// Marks the active entry at `url` inactive, recording its replacement
    ///
    /// Returns false when no active entry has that URL.
    fn mark_superseded(&mut self, url: &str, replacement: Option<&str>) -> StoreResult<bool>;

    /// URLs of every active entry, sorted
    fn active_urls(&self) -> StoreResult<Vec<String>>;

    /// Makes writes outside a load durable
    fn flush(&mut self) -> StoreResult<()> {
        Ok(())
    }
}
