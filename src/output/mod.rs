//! Output module for sweep statistics and reports
//!
//! This module handles:
//! - Aggregating unit, region and global outcomes while a worker runs
//! - Writing and reading the per-worker JSON report
//! - Printing a report summary to the console

mod report;
pub mod stats;

pub use report::{print_report, ElapsedTime, ReportSummary, WorkerReport};
pub use stats::{ErrorEntry, GlobalOutcome, RegionOutcome, StatisticsAggregator, UnitOutcome};
