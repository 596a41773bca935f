//! Field extractor
//!
//! Pure transformation from a captured detail page ([`DetailSnapshot`]) to an
//! [`ExtractedRecord`](crate::model::ExtractedRecord). Capturing the snapshot
//! is the job of the navigation layer; nothing here touches the browser.

mod countdown;
mod fields;

pub use countdown::{auction_end, parse_countdown_cell, Countdown};
pub use fields::{capture, capture_number, extract_record, DetailSnapshot};
