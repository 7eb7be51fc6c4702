//! File-backed catalog store
//!
//! The whole store is one JSON snapshot, rewritten atomically whenever a load
//! completes or the store is flushed.

use crate::artifact::write_json_atomic;
use crate::loader::traits::{CatalogStore, NaturalKey, StoreError, StoreResult, StoredProduct};
use crate::records::{CleanRecord, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One loader run as recorded in the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadEntry {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_hash: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    schema_version: u32,
    next_id: i64,
    loads: Vec<LoadEntry>,
    products: Vec<StoredProduct>,
}

/// Catalog store persisted as `store/catalog.json`
pub struct FileCatalogStore {
    path: PathBuf,
    snapshot: Snapshot,
}

impl FileCatalogStore {
    /// Opens the snapshot at `path`, starting empty when it does not exist
    pub fn open(path: &Path) -> StoreResult<Self> {
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            if snapshot.schema_version > SCHEMA_VERSION {
                return Err(StoreError::Corrupt(format!(
                    "{} has schema version {}, newer than {}",
                    path.display(),
                    snapshot.schema_version,
                    SCHEMA_VERSION
                )));
            }
            snapshot
        } else {
            Snapshot {
                schema_version: SCHEMA_VERSION,
                next_id: 1,
                ..Default::default()
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            snapshot,
        })
    }

    pub fn loads(&self) -> &[LoadEntry] {
        &self.snapshot.loads
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.snapshot.next_id.max(1);
        self.snapshot.next_id = id + 1;
        id
    }

    fn position(&self, key: &NaturalKey) -> Option<usize> {
        self.snapshot.products.iter().position(|p| match key {
            NaturalKey::Url(url) => p.record.url == *url,
            NaturalKey::Sku(sku) => p.record.url.is_empty() && p.record.sku.as_deref() == Some(sku),
        })
    }

    fn save(&self) -> StoreResult<()> {
        write_json_atomic(&self.path, &self.snapshot).map_err(|e| match e {
            crate::SieveError::Io(e) => StoreError::Io(e),
            crate::SieveError::Json(e) => StoreError::Serialization(e),
            other => StoreError::Corrupt(other.to_string()),
        })
    }
}

impl CatalogStore for FileCatalogStore {
    fn begin_load(&mut self, config_hash: &str) -> StoreResult<i64> {
        let id = self.snapshot.loads.iter().map(|l| l.id).max().unwrap_or(0) + 1;
        self.snapshot.loads.push(LoadEntry {
            id,
            started_at: Utc::now(),
            finished_at: None,
            config_hash: config_hash.to_string(),
            status: "running".to_string(),
        });
        Ok(id)
    }

    fn complete_load(&mut self, load_id: i64) -> StoreResult<()> {
        let load = self
            .snapshot
            .loads
            .iter_mut()
            .find(|l| l.id == load_id)
            .ok_or(StoreError::LoadNotFound(load_id))?;
        load.status = "completed".to_string();
        load.finished_at = Some(Utc::now());
        self.save()
    }

    fn upsert(&mut self, load_id: i64, record: &CleanRecord) -> StoreResult<i64> {
        let key = NaturalKey::of(record)
            .ok_or_else(|| StoreError::MissingNaturalKey(record.title.clone()))?;
        match self.position(&key) {
            Some(index) => {
                let product = &mut self.snapshot.products[index];
                product.record = record.clone();
                product.last_load = load_id;
                product.active = true;
                product.superseded_by = None;
                Ok(product.id)
            }
            None => {
                let id = self.allocate_id();
                self.snapshot.products.push(StoredProduct {
                    id,
                    record: record.clone(),
                    active: true,
                    superseded_by: None,
                    first_load: load_id,
                    last_load: load_id,
                });
                Ok(id)
            }
        }
    }

    fn find_by_natural_key(&self, key: &NaturalKey) -> StoreResult<Option<StoredProduct>> {
        Ok(self.position(key).map(|i| self.snapshot.products[i].clone()))
    }

    fn mark_superseded(&mut self, url: &str, replacement: Option<&str>) -> StoreResult<bool> {
        let Some(product) = self
            .snapshot
            .products
            .iter_mut()
            .find(|p| p.active && p.record.url == url)
        else {
            return Ok(false);
        };
        product.active = false;
        product.superseded_by = replacement.map(str::to_string);
        Ok(true)
    }

    fn active_urls(&self) -> StoreResult<Vec<String>> {
        let mut urls: Vec<String> = self
            .snapshot
            .products
            .iter()
            .filter(|p| p.active && !p.record.url.is_empty())
            .map(|p| p.record.url.clone())
            .collect();
        urls.sort();
        Ok(urls)
    }

    fn flush(&mut self) -> StoreResult<()> {
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(url: &str, title: &str) -> CleanRecord {
        let now = Utc::now();
        CleanRecord {
            url: url.to_string(),
            title: title.to_string(),
            price: Some(12.5),
            description: None,
            images: Vec::new(),
            category: None,
            brand: None,
            sku: None,
            availability: None,
            rating: None,
            reviews_count: None,
            timestamp_fetched: now,
            timestamp_parsed: now,
        }
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store").join("catalog.json");

        let mut store = FileCatalogStore::open(&path).unwrap();
        let load = store.begin_load("abc").unwrap();
        let id = store.upsert(load, &record("https://shop.example/p/1", "Widget")).unwrap();
        store.complete_load(load).unwrap();

        let mut reopened = FileCatalogStore::open(&path).unwrap();
        assert_eq!(reopened.loads().len(), 1);
        assert_eq!(reopened.loads()[0].status, "completed");

        let second = reopened.begin_load("abc").unwrap();
        assert_eq!(second, 2);
        let again = reopened
            .upsert(second, &record("https://shop.example/p/1", "Widget renamed"))
            .unwrap();
        assert_eq!(again, id);

        let stored = reopened
            .find_by_natural_key(&NaturalKey::Url("https://shop.example/p/1".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(stored.first_load, 1);
        assert_eq!(stored.last_load, 2);
        assert_eq!(stored.record.title, "Widget renamed");
    }

    #[test]
    fn test_superseded_entries_are_kept_inactive() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCatalogStore::open(&dir.path().join("catalog.json")).unwrap();
        let load = store.begin_load("abc").unwrap();
        store.upsert(load, &record("https://shop.example/p/1", "Widget")).unwrap();

        assert!(store.mark_superseded("https://shop.example/p/1", None).unwrap());
        assert!(store.active_urls().unwrap().is_empty());
        let stored = store
            .find_by_natural_key(&NaturalKey::Url("https://shop.example/p/1".to_string()))
            .unwrap()
            .unwrap();
        assert!(!stored.active);

        store.upsert(load, &record("https://shop.example/p/1", "Widget")).unwrap();
        assert_eq!(store.active_urls().unwrap().len(), 1);
    }

    #[test]
    fn test_record_without_url_or_sku_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCatalogStore::open(&dir.path().join("catalog.json")).unwrap();
        let load = store.begin_load("abc").unwrap();
        let result = store.upsert(load, &record("", "Nameless"));
        assert!(matches!(result, Err(StoreError::MissingNaturalKey(_))));
    }
}
