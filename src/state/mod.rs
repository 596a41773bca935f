//! State module for tracking sweep progress
//!
//! # Components
//!
//! - `UnitStatus`: Tracks the lifecycle of a sub-region unit (pending, processing, success, error)

mod unit_state;

// Re-export main types
pub use unit_state::UnitStatus;
