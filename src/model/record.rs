//! Extracted property records
//!
//! Field groups mirror the sections of a detail page. Missing labels are
//! stored as empty strings, missing numbers as `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured record extracted from one detail page
///
/// Every text field is present; a label that does not appear on the page
/// yields an empty string. Numeric fields are `None` when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub image_url: String,
    pub title: String,
    pub values: AuctionValues,
    pub features: PropertyFeatures,
    pub identification: Identification,
    pub auction: AuctionInfo,
    pub location: Location,
    /// Derived from the countdown cells, relative to extraction time
    pub auction_ends_at: Option<DateTime<Utc>>,
    pub description: String,
    pub payment_methods: String,
    pub expense_rules: String,
    pub observations: String,
}

/// Monetary values, kept in their displayed form (e.g. `R$ 250.000,00`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuctionValues {
    pub appraisal: String,
    pub minimum_first_auction: String,
    pub minimum_second_auction: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyFeatures {
    pub property_type: String,
    pub rooms: Option<u32>,
    pub garage: Option<u32>,
    pub total_area: String,
    pub private_area: String,
    pub land_area: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    /// External property number, the primary deduplication key
    pub property_number: String,
    pub registrations: String,
    pub district: String,
    pub registry_office: Option<u32>,
    pub municipal_registration: String,
    pub negative_auction_note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuctionInfo {
    pub modality: String,
    pub edital: String,
    pub item_number: String,
    pub auctioneer: String,
    pub first_auction_date: String,
    pub second_auction_date: String,
    pub discount: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub cep: String,
    pub city: String,
    pub state: String,
}
