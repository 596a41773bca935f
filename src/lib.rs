//! Leilao-Sweep: a resilient crawler for a nested auction listing form
//!
//! This crate drives an automated browser through a region selector, a
//! sub-region selector, a paginated result listing and per-item detail pages,
//! extracts structured property records, persists them idempotently and
//! tracks progress per unit of work across independent worker processes.

pub mod config;
pub mod crawler;
pub mod driver;
pub mod extract;
pub mod model;
pub mod navigation;
pub mod output;
pub mod state;
pub mod storage;

use driver::{DriverError, ElementSnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Leilao-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Timed out waiting for {description}")]
    NavigationTimeout {
        description: String,
        selector: Option<String>,
        diagnostics: Option<Box<ElementSnapshot>>,
    },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Element {selector} is not interactable: {reason}")]
    ElementNotInteractable { selector: String, reason: String },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] storage::SinkError),

    #[error("Unit {unit} aborted in {function}: {source}")]
    UnitAborted {
        unit: String,
        function: String,
        step: Option<String>,
        source: Box<SweepError>,
    },

    #[error("Browser driver error: {0}")]
    Driver(DriverError),

    #[error("Invalid status transition for unit {unit}: {from} -> {to}")]
    InvalidTransition {
        unit: String,
        from: UnitStatus,
        to: UnitStatus,
    },

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Partition error: {0}")]
    Partition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DriverError> for SweepError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotFound { selector } => Self::ElementNotFound { selector },
            DriverError::NotInteractable { selector, reason } => {
                Self::ElementNotInteractable { selector, reason }
            }
            other => Self::Driver(other),
        }
    }
}

impl SweepError {
    /// Wraps a failure that happened while sweeping one unit
    pub fn aborted(
        unit: &model::SubRegionUnit,
        function: &str,
        step: Option<String>,
        source: SweepError,
    ) -> Self {
        Self::UnitAborted {
            unit: unit.key().to_string(),
            function: function.to_string(),
            step,
            source: Box::new(source),
        }
    }

    /// Returns true when the browser session itself is gone
    ///
    /// A fatal error ends the worker; anything else only ends the current unit.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Driver(DriverError::SessionClosed) => true,
            Self::UnitAborted { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Returns the innermost error, skipping `UnitAborted` wrappers
    pub fn root_cause(&self) -> &SweepError {
        match self {
            Self::UnitAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Collects the diagnostic context of this error for reports
    pub fn detail(&self) -> FailureDetail {
        let mut detail = FailureDetail::default();
        let mut current = self;

        loop {
            match current {
                Self::UnitAborted {
                    function,
                    step,
                    source,
                    ..
                } => {
                    if detail.function.is_empty() {
                        detail.function = function.clone();
                        detail.step = step.clone();
                    }
                    current = source;
                }
                Self::NavigationTimeout {
                    selector,
                    diagnostics,
                    ..
                } => {
                    detail.selector = selector.clone();
                    detail.snapshot = diagnostics.as_deref().cloned();
                    break;
                }
                Self::ElementNotFound { selector } | Self::ElementNotInteractable { selector, .. } => {
                    detail.selector = Some(selector.clone());
                    break;
                }
                _ => break,
            }
        }

        detail
    }
}

/// Where a failure happened, plus the DOM state captured at that moment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Crawl function that failed (e.g. `open_item`)
    pub function: String,

    /// Position inside the function (e.g. `page 2 item 5`)
    pub step: Option<String>,

    /// Selector that could not be satisfied
    pub selector: Option<String>,

    /// Element snapshot captured when the failure was raised
    pub snapshot: Option<ElementSnapshot>,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Leilao-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{ExtractedRecord, SubRegion, SubRegionUnit, UnitKey};
pub use state::UnitStatus;
