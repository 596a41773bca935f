//! Browser driver module
//!
//! The navigation layer talks to the browser only through [`BrowserDriver`].
//!
//! # Drivers
//!
//! - `MockSite`: in-memory model of the auction site, used by tests and dry runs
//! - `ChromiumDriver`: a real Chromium session over CDP (feature `browser`)

#[cfg(feature = "browser")]
mod chromium;
pub mod mock;
mod traits;

#[cfg(feature = "browser")]
pub use chromium::ChromiumDriver;
pub use traits::{
    BoundingBox, BrowserDriver, DriverError, DriverResult, ElementInfo, ElementSnapshot, Locator,
};
