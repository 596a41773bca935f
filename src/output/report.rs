//! Worker report files
//!
//! Every worker run ends by writing one JSON report. Reports are the only
//! channel between workers and the retry run.

use super::stats::{GlobalOutcome, RegionOutcome, StatisticsAggregator, UnitOutcome};
use crate::model::SubRegionUnit;
use crate::SweepError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of errors shown by [`print_report`]
const PRINTED_ERRORS: usize = 10;

/// Wall-clock duration of a run in several units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElapsedTime {
    pub millis: u64,
    pub seconds: u64,
    pub minutes: u64,
    pub formatted: String,
}

impl ElapsedTime {
    pub fn from_millis(millis: u64) -> Self {
        let seconds = millis / 1000;
        let minutes = seconds / 60;
        let hours = minutes / 60;

        let formatted = if hours > 0 {
            format!("{}h {:02}m {:02}s", hours, minutes % 60, seconds % 60)
        } else {
            format!("{}m {:02}s", minutes, seconds % 60)
        };

        Self {
            millis,
            seconds,
            minutes,
            formatted,
        }
    }
}

/// Headline numbers of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Share of processed units that succeeded, in percent
    pub success_rate: f64,
    pub total_records_processed: u64,
    pub error_count: usize,
    pub errors_truncated: u64,
}

/// The JSON document written at the end of a worker run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReport {
    /// `"0"`, `"1"`, ... for partition workers, `"retry"` for the retry run
    pub worker_id: String,
    pub label: String,
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: ElapsedTime,
    pub global: GlobalOutcome,
    pub summary: ReportSummary,
    pub regions: Vec<RegionOutcome>,
    pub units: Vec<UnitOutcome>,
    pub failed_units: Vec<SubRegionUnit>,
}

impl WorkerReport {
    /// Builds a report from the statistics of a finished run
    ///
    /// # Arguments
    ///
    /// * `worker_id` - Identifier of the worker that produced the statistics
    /// * `label` - Human readable description of the run
    /// * `config_hash` - Hash of the configuration the run used
    /// * `started_at` - When the run started
    /// * `stats` - The run's statistics
    pub fn from_statistics(
        worker_id: &str,
        label: &str,
        config_hash: &str,
        started_at: DateTime<Utc>,
        stats: &StatisticsAggregator,
    ) -> Self {
        let global = stats.global();

        let success_rate = if global.units_processed > 0 {
            (global.units_succeeded as f64 / global.units_processed as f64) * 100.0
        } else {
            0.0
        };

        let summary = ReportSummary {
            success_rate,
            total_records_processed: global.records_found,
            error_count: global.units_failed,
            errors_truncated: global.errors_truncated,
        };

        Self {
            worker_id: worker_id.to_string(),
            label: label.to_string(),
            config_hash: config_hash.to_string(),
            started_at,
            finished_at: Utc::now(),
            elapsed: ElapsedTime::from_millis(global.elapsed_ms),
            summary,
            regions: stats.regions().to_vec(),
            units: stats.units().to_vec(),
            failed_units: stats.failed_units(),
            global,
        }
    }

    /// Writes the report as pretty-printed JSON, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<(), SweepError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a report written by [`WorkerReport::write_to`]
    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Prints a report to stdout in a formatted manner
///
/// # Arguments
///
/// * `report` - The report to display
pub fn print_report(report: &WorkerReport) {
    let global = &report.global;

    println!("=== Sweep Report: {} ===\n", report.label);

    println!("Overview:");
    println!("  Worker: {}", report.worker_id);
    println!("  Config hash: {}", report.config_hash);
    println!("  Started: {}", report.started_at.to_rfc3339());
    println!("  Finished: {}", report.finished_at.to_rfc3339());
    println!("  Elapsed: {}", report.elapsed.formatted);
    println!();

    println!("Units:");
    println!("  Total: {}", global.total_units);
    println!("  Processed: {}", global.units_processed);
    println!("  Succeeded: {}", global.units_succeeded);
    println!("  Failed: {}", global.units_failed);
    println!("  Attempts: {} ({} retries)", global.attempts, global.retries);
    println!();

    println!("Records:");
    println!("  Found: {}", global.records_found);
    println!("  Saved: {}", global.records_saved);
    println!("  Duplicate: {}", global.records_duplicate);
    println!("  Failed: {}", global.records_failed);
    println!();

    if !report.regions.is_empty() {
        println!("Regions ({}):", report.regions.len());
        for region in &report.regions {
            println!(
                "  {} [{}]: {}/{} units, {} ok, {} failed, {} saved",
                region.region,
                region.region_id,
                region.units_processed,
                region.total_units,
                region.units_succeeded,
                region.units_failed,
                region.records_saved
            );
        }
        println!();
    }

    if !global.errors.is_empty() {
        println!("Errors ({}):", global.errors.len());
        for entry in global.errors.iter().take(PRINTED_ERRORS) {
            println!("  - {} ({}): {}", entry.label, entry.unit, entry.message);
            if let Some(selector) = &entry.failure.selector {
                println!("      selector: {}", selector);
            }
        }
        if global.errors.len() > PRINTED_ERRORS {
            println!("  ... and {} more", global.errors.len() - PRINTED_ERRORS);
        }
        if global.errors_truncated > 0 {
            println!("  ({} not logged)", global.errors_truncated);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} units successfully processed)",
        report.summary.success_rate, global.units_succeeded, global.units_processed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UnitStatus;
    use crate::storage::SaveOutcome;

    #[test]
    fn test_elapsed_formatting() {
        assert_eq!(ElapsedTime::from_millis(65_000).formatted, "1m 05s");
        assert_eq!(ElapsedTime::from_millis(3_725_000).formatted, "1h 02m 05s");

        let elapsed = ElapsedTime::from_millis(125_500);
        assert_eq!(elapsed.seconds, 125);
        assert_eq!(elapsed.minutes, 2);
    }

    #[test]
    fn test_report_roundtrip_through_file() {
        let mut stats = StatisticsAggregator::new(1, 2, 10);
        let ok = SubRegionUnit::new("Paraná", "PR", "Curitiba", "1");
        let bad = SubRegionUnit::new("Paraná", "PR", "Londrina", "2");

        stats.start_unit(&ok).unwrap();
        stats.record_persistence(
            &ok.key(),
            SaveOutcome {
                saved: 3,
                duplicate: 1,
                failed: 0,
            },
        );
        stats.finish_unit(&ok.key(), UnitStatus::Success, None).unwrap();
        stats.start_unit(&bad).unwrap();
        stats
            .finish_unit(
                &bad.key(),
                UnitStatus::Error,
                Some(&SweepError::ElementNotFound {
                    selector: "#cmb_cidade".to_string(),
                }),
            )
            .unwrap();

        let report = WorkerReport::from_statistics("0", "worker 0", "abc", Utc::now(), &stats);
        assert_eq!(report.summary.success_rate, 50.0);
        assert_eq!(report.summary.total_records_processed, 4);
        assert_eq!(report.failed_units, vec![bad]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("worker-0-report.json");
        report.write_to(&path).unwrap();

        let loaded = WorkerReport::load(&path).unwrap();
        assert_eq!(loaded.units.len(), 2);
        assert_eq!(loaded.units[1].status, UnitStatus::Error);
        assert_eq!(
            loaded.global.errors[0].failure.selector.as_deref(),
            Some("#cmb_cidade")
        );

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["global"]["recordsSaved"], 3);
        assert_eq!(json["units"][0]["unit"]["subRegion"]["label"], "Curitiba");
    }
}
