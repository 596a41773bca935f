//! Record sink trait and error types
//!
//! This module defines the trait interface for persistence backends and
//! associated error types.

use crate::storage::PropertyRow;
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for persistence operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Trait for persistence backends
///
/// Implementations must treat a second insert of a row with the same
/// property number as a no-op rather than an error.
pub trait RecordSink {
    /// Checks whether a row with the same identity is already stored
    ///
    /// Identity is the property number when present, otherwise the
    /// (title, address, city) triple. Rows with neither are never reported
    /// as existing.
    fn exists(&self, row: &PropertyRow) -> SinkResult<bool>;

    /// Inserts one row
    ///
    /// # Returns
    ///
    /// The new row id, or `None` if a uniqueness constraint skipped the insert
    fn save_one(&mut self, row: &PropertyRow) -> SinkResult<Option<i64>>;

    /// Inserts rows atomically
    ///
    /// # Returns
    ///
    /// The ids of the rows actually inserted; rows skipped by a uniqueness
    /// constraint have no id. On error nothing is inserted.
    fn save_batch(&mut self, rows: &[PropertyRow]) -> SinkResult<Vec<i64>>;

    /// Counts stored rows
    fn count_records(&self) -> SinkResult<u64>;
}
