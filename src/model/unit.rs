//! Units of work
//!
//! A unit is one sub-region of one region. Its key (region id, sub-region id)
//! identifies it across partition files, reports and the retry set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One option of the second-level (sub-region) selector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubRegion {
    /// Visible option label
    pub label: String,

    /// Option value submitted to the form
    pub id: String,
}

/// The atomic unit of work: one region plus one of its sub-regions
///
/// Serializes as `{ "region", "regionId", "subRegion": { "label", "id" } }`,
/// the layout of partition files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRegionUnit {
    /// Region label
    pub region: String,

    /// Region option value
    pub region_id: String,

    /// Sub-region within the region
    pub sub_region: SubRegion,
}

impl SubRegionUnit {
    /// Creates a unit from its labels and option values
    pub fn new(
        region: impl Into<String>,
        region_id: impl Into<String>,
        sub_region_label: impl Into<String>,
        sub_region_id: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            region_id: region_id.into(),
            sub_region: SubRegion {
                label: sub_region_label.into(),
                id: sub_region_id.into(),
            },
        }
    }

    /// Returns the identity of this unit
    pub fn key(&self) -> UnitKey {
        UnitKey {
            region_id: self.region_id.clone(),
            sub_region_id: self.sub_region.id.clone(),
        }
    }
}

impl fmt::Display for SubRegionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.sub_region.label)
    }
}

/// Identity of a unit: `(region_id, sub_region_id)`
///
/// Two units with the same key are the same unit, whatever their labels say.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitKey {
    pub region_id: String,
    pub sub_region_id: String,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.region_id, self.sub_region_id)
    }
}
