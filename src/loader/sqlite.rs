//! SQLite catalog store
//!
//! This module provides a SQLite-based implementation of the CatalogStore trait.

use crate::loader::schema::initialize_schema;
use crate::loader::traits::{CatalogStore, NaturalKey, StoreError, StoreResult, StoredProduct};
use crate::records::{Availability, CleanRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const PRODUCT_COLUMNS: &str = "id, url, sku, title, price, description, images, category, brand, \
     availability, rating, reviews_count, timestamp_fetched, timestamp_parsed, first_load, \
     last_load, active, superseded_by";

/// SQLite catalog store
pub struct SqliteCatalogStore {
    conn: Connection,
}

impl SqliteCatalogStore {
    /// Opens or creates the catalog database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCatalogStore)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn find_id(&self, key: &NaturalKey) -> StoreResult<Option<i64>> {
        let id = match key {
            NaturalKey::Url(url) => self
                .conn
                .query_row("SELECT id FROM products WHERE url = ?1", params![url], |row| row.get(0))
                .optional()?,
            NaturalKey::Sku(sku) => self
                .conn
                .query_row(
                    "SELECT id FROM products WHERE url IS NULL AND sku = ?1 ORDER BY id LIMIT 1",
                    params![sku],
                    |row| row.get(0),
                )
                .optional()?,
        };
        Ok(id)
    }

    /// Number of load runs recorded
    pub fn load_count(&self) -> StoreResult<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM loads", [], |row| row.get(0))?)
    }
}

fn parse_time(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", value, e)))
}

fn parse_availability(value: Option<String>) -> StoreResult<Option<Availability>> {
    value
        .map(|v| serde_json::from_value(serde_json::Value::String(v)))
        .transpose()
        .map_err(StoreError::from)
}

/// Raw column values of one product row
struct ProductRow {
    id: i64,
    url: Option<String>,
    sku: Option<String>,
    title: String,
    price: Option<f64>,
    description: Option<String>,
    images: String,
    category: Option<String>,
    brand: Option<String>,
    availability: Option<String>,
    rating: Option<f64>,
    reviews_count: Option<u32>,
    timestamp_fetched: String,
    timestamp_parsed: String,
    first_load: i64,
    last_load: i64,
    active: bool,
    superseded_by: Option<String>,
}

impl ProductRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            url: row.get(1)?,
            sku: row.get(2)?,
            title: row.get(3)?,
            price: row.get(4)?,
            description: row.get(5)?,
            images: row.get(6)?,
            category: row.get(7)?,
            brand: row.get(8)?,
            availability: row.get(9)?,
            rating: row.get(10)?,
            reviews_count: row.get(11)?,
            timestamp_fetched: row.get(12)?,
            timestamp_parsed: row.get(13)?,
            first_load: row.get(14)?,
            last_load: row.get(15)?,
            active: row.get::<_, i64>(16)? != 0,
            superseded_by: row.get(17)?,
        })
    }

    fn into_product(self) -> StoreResult<StoredProduct> {
        Ok(StoredProduct {
            id: self.id,
            record: CleanRecord {
                url: self.url.unwrap_or_default(),
                title: self.title,
                price: self.price,
                description: self.description,
                images: serde_json::from_str(&self.images)?,
                category: self.category,
                brand: self.brand,
                sku: self.sku,
                availability: parse_availability(self.availability)?,
                rating: self.rating,
                reviews_count: self.reviews_count,
                timestamp_fetched: parse_time(&self.timestamp_fetched)?,
                timestamp_parsed: parse_time(&self.timestamp_parsed)?,
            },
            active: self.active,
            superseded_by: self.superseded_by,
            first_load: self.first_load,
            last_load: self.last_load,
        })
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn begin_load(&mut self, config_hash: &str) -> StoreResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO loads (started_at, config_hash, status) VALUES (?1, ?2, 'running')",
            params![now, config_hash],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn complete_load(&mut self, load_id: i64) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE loads SET status = 'completed', finished_at = ?1 WHERE id = ?2",
            params![now, load_id],
        )?;
        if updated == 0 {
            return Err(StoreError::LoadNotFound(load_id));
        }
        Ok(())
    }

    fn upsert(&mut self, load_id: i64, record: &CleanRecord) -> StoreResult<i64> {
        let key = NaturalKey::of(record)
            .ok_or_else(|| StoreError::MissingNaturalKey(record.title.clone()))?;
        let url = (!record.url.is_empty()).then_some(record.url.as_str());
        let images = serde_json::to_string(&record.images)?;
        let availability = record.availability.map(|a| a.as_str());
        let fetched = record.timestamp_fetched.to_rfc3339();
        let parsed = record.timestamp_parsed.to_rfc3339();
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        let existing: Option<i64> = match &key {
            NaturalKey::Url(url) => tx
                .query_row("SELECT id FROM products WHERE url = ?1", params![url], |row| row.get(0))
                .optional()?,
            NaturalKey::Sku(sku) => tx
                .query_row(
                    "SELECT id FROM products WHERE url IS NULL AND sku = ?1 ORDER BY id LIMIT 1",
                    params![sku],
                    |row| row.get(0),
                )
                .optional()?,
        };

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE products SET sku = ?1, title = ?2, price = ?3, description = ?4,
                        images = ?5, category = ?6, brand = ?7, availability = ?8, rating = ?9,
                        reviews_count = ?10, timestamp_fetched = ?11, timestamp_parsed = ?12,
                        last_load = ?13, active = 1, superseded_by = NULL, updated_at = ?14
                     WHERE id = ?15",
                    params![
                        record.sku,
                        record.title,
                        record.price,
                        record.description,
                        images,
                        record.category,
                        record.brand,
                        availability,
                        record.rating,
                        record.reviews_count,
                        fetched,
                        parsed,
                        load_id,
                        now,
                        id
                    ],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO products (url, sku, title, price, description, images, category,
                        brand, availability, rating, reviews_count, timestamp_fetched,
                        timestamp_parsed, first_load, last_load, active, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14, 1, ?15)",
                    params![
                        url,
                        record.sku,
                        record.title,
                        record.price,
                        record.description,
                        images,
                        record.category,
                        record.brand,
                        availability,
                        record.rating,
                        record.reviews_count,
                        fetched,
                        parsed,
                        load_id,
                        now
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };
        tx.commit()?;
        Ok(id)
    }

    fn find_by_natural_key(&self, key: &NaturalKey) -> StoreResult<Option<StoredProduct>> {
        let Some(id) = self.find_id(key)? else {
            return Ok(None);
        };
        let row = self.conn.query_row(
            &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS),
            params![id],
            ProductRow::from_row,
        )?;
        row.into_product().map(Some)
    }

    fn mark_superseded(&mut self, url: &str, replacement: Option<&str>) -> StoreResult<bool> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE products SET active = 0, superseded_by = ?1, updated_at = ?2
             WHERE url = ?3 AND active = 1",
            params![replacement, now, url],
        )?;
        Ok(updated > 0)
    }

    fn active_urls(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM products WHERE active = 1 AND url IS NOT NULL ORDER BY url")?;
        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }
}
