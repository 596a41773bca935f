//! Database schema definitions
//!
//! This module contains the SQL schema for the property database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Extracted auction properties
CREATE TABLE IF NOT EXISTS properties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT '',
    image_url TEXT,
    appraisal_value TEXT,
    minimum_first_auction TEXT,
    minimum_second_auction TEXT,
    property_type TEXT,
    rooms INTEGER,
    garage INTEGER,
    total_area TEXT,
    private_area TEXT,
    land_area TEXT,
    property_number TEXT UNIQUE,
    registrations TEXT,
    district TEXT,
    registry_office INTEGER,
    municipal_registration TEXT,
    negative_auction_note TEXT,
    modality TEXT,
    edital TEXT,
    item_number TEXT,
    auctioneer TEXT,
    first_auction_date TEXT,
    second_auction_date TEXT,
    discount TEXT,
    address TEXT,
    cep TEXT,
    city TEXT,
    state TEXT,
    description TEXT,
    payment_methods TEXT,
    expense_rules TEXT,
    observations TEXT,
    auction_ends_at TEXT,
    scraped_at TEXT NOT NULL
);

-- Fallback identity when no property number is known
CREATE INDEX IF NOT EXISTS idx_properties_identity ON properties(title, address, city);
CREATE INDEX IF NOT EXISTS idx_properties_city ON properties(city, state);
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
