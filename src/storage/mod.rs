//! Storage module for persisting extracted properties
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Flattening extracted records into table rows
//! - Idempotent saving with duplicate detection (`PersistenceGateway`)

mod gateway;
mod schema;
mod sqlite;
mod traits;

pub use gateway::{PersistenceGateway, SaveOutcome};
pub use sqlite::SqliteSink;
pub use traits::{RecordSink, SinkError, SinkResult};

use crate::model::ExtractedRecord;
use crate::SweepError;
use std::path::Path;

/// Opens or creates the property database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteSink)` - Successfully initialized sink
/// * `Err(SweepError)` - Failed to initialize the database
pub fn open_sink(path: &Path) -> Result<SqliteSink, SweepError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SqliteSink::new(path)
}

/// Identity used to decide whether a record was already stored
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PersistenceKey {
    /// The property number published by the site
    External(String),

    /// Title, address and city, when there is no property number
    Composite {
        title: String,
        address: String,
        city: String,
    },

    /// Not enough data to tell; never treated as a duplicate
    Unverifiable,
}

/// A record flattened into the `properties` table layout
///
/// Empty strings become `None` so they are stored as NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyRow {
    pub title: String,
    pub image_url: Option<String>,
    pub appraisal_value: Option<String>,
    pub minimum_first_auction: Option<String>,
    pub minimum_second_auction: Option<String>,
    pub property_type: Option<String>,
    pub rooms: Option<u32>,
    pub garage: Option<u32>,
    pub total_area: Option<String>,
    pub private_area: Option<String>,
    pub land_area: Option<String>,
    pub property_number: Option<String>,
    pub registrations: Option<String>,
    pub district: Option<String>,
    pub registry_office: Option<u32>,
    pub municipal_registration: Option<String>,
    pub negative_auction_note: Option<String>,
    pub modality: Option<String>,
    pub edital: Option<String>,
    pub item_number: Option<String>,
    pub auctioneer: Option<String>,
    pub first_auction_date: Option<String>,
    pub second_auction_date: Option<String>,
    pub discount: Option<String>,
    pub address: Option<String>,
    pub cep: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub description: Option<String>,
    pub payment_methods: Option<String>,
    pub expense_rules: Option<String>,
    pub observations: Option<String>,
    /// RFC 3339 timestamp
    pub auction_ends_at: Option<String>,
}

impl PropertyRow {
    /// Returns the identity this row is deduplicated by
    pub fn persistence_key(&self) -> PersistenceKey {
        if let Some(number) = &self.property_number {
            return PersistenceKey::External(number.clone());
        }

        match (&self.address, &self.city) {
            (Some(address), Some(city)) if !self.title.is_empty() => PersistenceKey::Composite {
                title: self.title.clone(),
                address: address.clone(),
                city: city.clone(),
            },
            _ => PersistenceKey::Unverifiable,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl From<&ExtractedRecord> for PropertyRow {
    fn from(record: &ExtractedRecord) -> Self {
        Self {
            title: record.title.trim().to_string(),
            image_url: non_empty(&record.image_url),
            appraisal_value: non_empty(&record.values.appraisal),
            minimum_first_auction: non_empty(&record.values.minimum_first_auction),
            minimum_second_auction: non_empty(&record.values.minimum_second_auction),
            property_type: non_empty(&record.features.property_type),
            rooms: record.features.rooms,
            garage: record.features.garage,
            total_area: non_empty(&record.features.total_area),
            private_area: non_empty(&record.features.private_area),
            land_area: non_empty(&record.features.land_area),
            property_number: non_empty(&record.identification.property_number),
            registrations: non_empty(&record.identification.registrations),
            district: non_empty(&record.identification.district),
            registry_office: record.identification.registry_office,
            municipal_registration: non_empty(&record.identification.municipal_registration),
            negative_auction_note: non_empty(&record.identification.negative_auction_note),
            modality: non_empty(&record.auction.modality),
            edital: non_empty(&record.auction.edital),
            item_number: non_empty(&record.auction.item_number),
            auctioneer: non_empty(&record.auction.auctioneer),
            first_auction_date: non_empty(&record.auction.first_auction_date),
            second_auction_date: non_empty(&record.auction.second_auction_date),
            discount: non_empty(&record.auction.discount),
            address: non_empty(&record.location.address),
            cep: non_empty(&record.location.cep),
            city: non_empty(&record.location.city),
            state: non_empty(&record.location.state),
            description: non_empty(&record.description),
            payment_methods: non_empty(&record.payment_methods),
            expense_rules: non_empty(&record.expense_rules),
            observations: non_empty(&record.observations),
            auction_ends_at: record.auction_ends_at.map(|at| at.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(number: &str, title: &str, address: &str, city: &str) -> ExtractedRecord {
        let mut record = ExtractedRecord {
            title: title.to_string(),
            ..Default::default()
        };
        record.identification.property_number = number.to_string();
        record.location.address = address.to_string();
        record.location.city = city.to_string();
        record
    }

    #[test]
    fn test_empty_strings_become_null() {
        let row = PropertyRow::from(&record("", "Casa", "  ", "CURITIBA"));
        assert_eq!(row.property_number, None);
        assert_eq!(row.address, None);
        assert_eq!(row.city.as_deref(), Some("CURITIBA"));
    }

    #[test]
    fn test_persistence_key_precedence() {
        let row = PropertyRow::from(&record("123", "Casa", "Rua A", "CURITIBA"));
        assert_eq!(row.persistence_key(), PersistenceKey::External("123".to_string()));

        let row = PropertyRow::from(&record("", "Casa", "Rua A", "CURITIBA"));
        assert_eq!(
            row.persistence_key(),
            PersistenceKey::Composite {
                title: "Casa".to_string(),
                address: "Rua A".to_string(),
                city: "CURITIBA".to_string(),
            }
        );

        let row = PropertyRow::from(&record("", "Casa", "", "CURITIBA"));
        assert_eq!(row.persistence_key(), PersistenceKey::Unverifiable);

        let row = PropertyRow::from(&record("", "", "Rua A", "CURITIBA"));
        assert_eq!(row.persistence_key(), PersistenceKey::Unverifiable);
    }

    #[test]
    fn test_open_sink_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("imoveis.db");
        let sink = open_sink(&path).unwrap();
        assert_eq!(sink.count_records().unwrap(), 0);
        assert!(path.exists());
    }
}
