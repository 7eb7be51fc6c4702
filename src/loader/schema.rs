//! Catalog database schema

/// SQL schema for the catalog database
pub const SCHEMA_SQL: &str = r#"
-- Track loader runs
CREATE TABLE IF NOT EXISTS loads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Catalog entries; superseded rows stay with active = 0
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT,
    sku TEXT,
    title TEXT NOT NULL,
    price REAL,
    description TEXT,
    images TEXT NOT NULL DEFAULT '[]',
    category TEXT,
    brand TEXT,
    availability TEXT,
    rating REAL,
    reviews_count INTEGER,
    timestamp_fetched TEXT NOT NULL,
    timestamp_parsed TEXT NOT NULL,
    first_load INTEGER NOT NULL REFERENCES loads(id),
    last_load INTEGER NOT NULL REFERENCES loads(id),
    active INTEGER NOT NULL DEFAULT 1,
    superseded_by TEXT,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_products_url ON products(url) WHERE url IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_products_sku ON products(sku);
CREATE INDEX IF NOT EXISTS idx_products_active ON products(active);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
