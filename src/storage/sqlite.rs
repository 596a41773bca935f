//! SQLite record sink
//!
//! This module provides a SQLite-based implementation of the RecordSink trait.
//! Several worker processes may write to the same database file; WAL mode and
//! a busy timeout let them take turns.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordSink, SinkError, SinkResult};
use crate::storage::{PersistenceKey, PropertyRow};
use crate::SweepError;
use chrono::Utc;
use rusqlite::{params, Connection, Statement};
use std::path::Path;

const INSERT_SQL: &str = "
    INSERT INTO properties (
        title, image_url, appraisal_value, minimum_first_auction, minimum_second_auction,
        property_type, rooms, garage, total_area, private_area, land_area,
        property_number, registrations, district, registry_office, municipal_registration,
        negative_auction_note, modality, edital, item_number, auctioneer,
        first_auction_date, second_auction_date, discount, address, cep, city, state,
        description, payment_methods, expense_rules, observations, auction_ends_at, scraped_at
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
        ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34
    )
    ON CONFLICT(property_number) DO NOTHING";

/// SQLite persistence backend
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens or creates the property database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(SweepError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SweepError> {
        let conn = Connection::open(path).map_err(SinkError::from)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(SinkError::from)?;

        initialize_schema(&conn).map_err(SinkError::from)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, SweepError> {
        let conn = Connection::open_in_memory().map_err(SinkError::from)?;
        initialize_schema(&conn).map_err(SinkError::from)?;
        Ok(Self { conn })
    }
}

fn insert_row(stmt: &mut Statement<'_>, row: &PropertyRow, scraped_at: &str) -> rusqlite::Result<usize> {
    stmt.execute(params![
        row.title,
        row.image_url,
        row.appraisal_value,
        row.minimum_first_auction,
        row.minimum_second_auction,
        row.property_type,
        row.rooms,
        row.garage,
        row.total_area,
        row.private_area,
        row.land_area,
        row.property_number,
        row.registrations,
        row.district,
        row.registry_office,
        row.municipal_registration,
        row.negative_auction_note,
        row.modality,
        row.edital,
        row.item_number,
        row.auctioneer,
        row.first_auction_date,
        row.second_auction_date,
        row.discount,
        row.address,
        row.cep,
        row.city,
        row.state,
        row.description,
        row.payment_methods,
        row.expense_rules,
        row.observations,
        row.auction_ends_at,
        scraped_at,
    ])
}

impl RecordSink for SqliteSink {
    fn exists(&self, row: &PropertyRow) -> SinkResult<bool> {
        let found = match row.persistence_key() {
            PersistenceKey::External(number) => self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM properties WHERE property_number = ?1)",
                params![number],
                |r| r.get(0),
            )?,
            PersistenceKey::Composite {
                title,
                address,
                city,
            } => self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM properties WHERE title = ?1 AND address = ?2 AND city = ?3)",
                params![title, address, city],
                |r| r.get(0),
            )?,
            PersistenceKey::Unverifiable => false,
        };
        Ok(found)
    }

    fn save_one(&mut self, row: &PropertyRow) -> SinkResult<Option<i64>> {
        let scraped_at = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(INSERT_SQL)?;
        let inserted = insert_row(&mut stmt, row, &scraped_at)?;
        drop(stmt);

        Ok((inserted == 1).then(|| self.conn.last_insert_rowid()))
    }

    fn save_batch(&mut self, rows: &[PropertyRow]) -> SinkResult<Vec<i64>> {
        let scraped_at = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(rows.len());

        {
            let mut stmt = tx.prepare(INSERT_SQL)?;
            for row in rows {
                if insert_row(&mut stmt, row, &scraped_at)? == 1 {
                    ids.push(tx.last_insert_rowid());
                }
            }
        }

        tx.commit()?;
        Ok(ids)
    }

    fn count_records(&self) -> SinkResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM properties", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
