//! Unit status definitions for tracking sweep progress
//!
//! This module defines the lifecycle a sub-region unit goes through while a
//! worker processes it.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current status of a unit in the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    /// Unit is known but its attempt has not started yet
    Pending,

    /// Unit is currently being swept
    Processing,

    /// Unit was selected, paged and walked to the end
    Success,

    /// Navigation for the unit was aborted
    Error,
}

impl UnitStatus {
    /// Returns true if this is a terminal state for the current attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if this represents an aborted unit
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`
    ///
    /// `Error -> Pending` is the re-admission taken by the retry pass.
    /// `Success` never leaves its state.
    pub fn can_transition_to(&self, next: UnitStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Success)
                | (Self::Processing, Self::Error)
                | (Self::Error, Self::Pending)
        )
    }

    /// Lowercase name used in reports and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
