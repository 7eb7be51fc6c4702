//! Catalog loader
//!
//! This module handles:
//! - The [`CatalogStore`] persistence trait
//! - A SQLite store and a single-file JSON store
//! - The load stage, which upserts `catalog.ndjson` into the configured store

mod file;
mod schema;
mod sqlite;
mod traits;

pub use file::{FileCatalogStore, LoadEntry};
pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteCatalogStore;
pub use traits::{CatalogStore, NaturalKey, StoreError, StoreResult, StoredProduct};

use crate::artifact::{self, read_ndjson};
use crate::config::LoaderBackend;
use crate::pipeline::StageContext;
use crate::records::{CleanRecord, StageStats};
use crate::Result;

/// Opens the store selected by `[loader]`
pub fn open_store(ctx: &StageContext) -> Result<Box<dyn CatalogStore>> {
    match ctx.config.loader.backend {
        LoaderBackend::File => Ok(Box::new(FileCatalogStore::open(&ctx.paths.file_store())?)),
        LoaderBackend::Sqlite => {
            let path = ctx
                .config
                .loader
                .database_path
                .clone()
                .unwrap_or_else(|| ctx.paths.database());
            Ok(Box::new(SqliteCatalogStore::open(&path)?))
        }
    }
}

/// True when the configured store already holds data
pub fn store_exists(ctx: &StageContext) -> bool {
    match ctx.config.loader.backend {
        LoaderBackend::File => ctx.paths.file_store().exists(),
        LoaderBackend::Sqlite => ctx
            .config
            .loader
            .database_path
            .clone()
            .unwrap_or_else(|| ctx.paths.database())
            .exists(),
    }
}

/// Runs the load stage
pub fn run(ctx: &StageContext) -> Result<StageStats> {
    let mut stats = ctx.new_stats("load");
    let input = ctx.paths.catalog_ndjson();
    artifact::require(&input, "clean")?;
    let records: Vec<CleanRecord> = read_ndjson(&input)?;
    stats.input = records.len() as u64;

    let mut store = open_store(ctx)?;
    tracing::info!(
        "Loading {} records for {} into the {:?} store",
        records.len(),
        ctx.domain,
        ctx.config.loader.backend
    );

    let load_id = store.begin_load(&ctx.config_hash)?;
    let mut inserted = 0u64;
    let mut updated = 0u64;
    for record in &records {
        let existed = match NaturalKey::of(record) {
            Some(key) => store.find_by_natural_key(&key)?.is_some(),
            None => {
                tracing::warn!("Skipping record without URL or SKU: {}", record.title);
                stats.drop_item("missing_natural_key");
                continue;
            }
        };
        store.upsert(load_id, record)?;
        if existed {
            updated += 1;
        } else {
            inserted += 1;
        }
        stats.output += 1;
    }
    store.complete_load(load_id)?;

    stats.detail("load_id", load_id);
    stats.detail("inserted", inserted);
    stats.detail("updated", updated);
    Ok(stats.finish())
}
