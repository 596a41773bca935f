//! Core data model
//!
//! - `SubRegionUnit` / `UnitKey`: the unit of work and its identity
//! - `ExtractedRecord`: the structured result of one detail page

mod record;
mod unit;

pub use record::{
    AuctionInfo, AuctionValues, ExtractedRecord, Identification, Location, PropertyFeatures,
};
pub use unit::{SubRegion, SubRegionUnit, UnitKey};
