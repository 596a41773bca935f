//! Sweep statistics
//!
//! Tracks outcomes at three scopes: unit, region and global. Record and
//! attempt counters only ever grow. Unit-status counts at region and global
//! scope are folds over the final unit table, so a unit that fails on the
//! first pass and succeeds on the retry pass counts once, as a success.

use crate::model::{SubRegionUnit, UnitKey};
use crate::state::UnitStatus;
use crate::storage::SaveOutcome;
use crate::{FailureDetail, SweepError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// Outcome of one unit, across every attempt made in this run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitOutcome {
    pub unit: SubRegionUnit,
    pub status: UnitStatus,
    pub records_found: u64,
    pub records_saved: u64,
    pub records_duplicate: u64,
    pub records_failed: u64,
    pub attempts: u32,

    /// Message of the last failure; cleared when a later attempt succeeds
    pub error: Option<String>,

    /// Diagnostics of the last failure
    pub failure: Option<FailureDetail>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Duration of the last attempt
    pub elapsed_ms: u64,
}

impl UnitOutcome {
    fn new(unit: SubRegionUnit) -> Self {
        Self {
            unit,
            status: UnitStatus::Pending,
            records_found: 0,
            records_saved: 0,
            records_duplicate: 0,
            records_failed: 0,
            attempts: 0,
            error: None,
            failure: None,
            started_at: None,
            finished_at: None,
            elapsed_ms: 0,
        }
    }
}

/// Outcome of one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionOutcome {
    pub region: String,
    pub region_id: String,
    pub total_units: usize,
    pub units_processed: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub records_found: u64,
    pub records_saved: u64,
    pub records_duplicate: u64,
    pub records_failed: u64,
    pub attempts: u64,

    /// Number of failed attempts in this region
    pub errors: u64,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// One logged unit failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub unit: UnitKey,
    pub label: String,
    pub message: String,
    pub failure: FailureDetail,
    pub at: DateTime<Utc>,
}

/// Totals for the whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalOutcome {
    pub total_regions: usize,
    pub total_units: usize,
    pub regions_processed: usize,
    pub units_processed: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub records_found: u64,
    pub records_saved: u64,
    pub records_duplicate: u64,
    pub records_failed: u64,
    pub attempts: u64,

    /// Attempts that re-admitted a failed unit
    pub retries: u64,

    pub elapsed_ms: u64,
    pub errors: Vec<ErrorEntry>,

    /// Failures not kept in `errors` because the log was full
    pub errors_truncated: u64,
}

/// Collects unit, region and global outcomes for one worker run
pub struct StatisticsAggregator {
    started: Instant,
    unit_started: HashMap<UnitKey, Instant>,
    total_regions: usize,
    total_units: usize,
    error_limit: usize,
    units: Vec<UnitOutcome>,
    unit_index: HashMap<UnitKey, usize>,
    regions: Vec<RegionOutcome>,
    region_index: HashMap<String, usize>,
    attempts: u64,
    retries: u64,
    errors: Vec<ErrorEntry>,
    errors_truncated: u64,
}

impl StatisticsAggregator {
    /// Creates an empty aggregator
    ///
    /// # Arguments
    ///
    /// * `total_regions` - Number of regions this run is expected to touch
    /// * `total_units` - Number of units this run is expected to process
    /// * `error_limit` - Maximum number of failures kept in the error log
    pub fn new(total_regions: usize, total_units: usize, error_limit: usize) -> Self {
        Self {
            started: Instant::now(),
            unit_started: HashMap::new(),
            total_regions,
            total_units,
            error_limit,
            units: Vec::new(),
            unit_index: HashMap::new(),
            regions: Vec::new(),
            region_index: HashMap::new(),
            attempts: 0,
            retries: 0,
            errors: Vec::new(),
            errors_truncated: 0,
        }
    }

    /// Registers a region; a second call for the same region is a no-op
    pub fn start_region(&mut self, region: &str, region_id: &str, total_units: usize) {
        if self.region_index.contains_key(region_id) {
            return;
        }

        self.region_index
            .insert(region_id.to_string(), self.regions.len());
        self.regions.push(RegionOutcome {
            region: region.to_string(),
            region_id: region_id.to_string(),
            total_units,
            units_processed: 0,
            units_succeeded: 0,
            units_failed: 0,
            records_found: 0,
            records_saved: 0,
            records_duplicate: 0,
            records_failed: 0,
            attempts: 0,
            errors: 0,
            started_at: Utc::now(),
            finished_at: None,
        });
    }

    /// Marks a region as finished; only the first call sets the timestamp
    pub fn finish_region(&mut self, region_id: &str) {
        if let Some(&idx) = self.region_index.get(region_id) {
            let region = &mut self.regions[idx];
            if region.finished_at.is_none() {
                region.finished_at = Some(Utc::now());
            }
        }
    }

    /// Starts an attempt for a unit
    ///
    /// A new unit enters as `Pending` and moves to `Processing`. A unit that
    /// ended in `Error` is re-admitted through `Pending`, which counts as a
    /// retry. A unit already in `Success` or `Processing` is rejected.
    pub fn start_unit(&mut self, unit: &SubRegionUnit) -> crate::Result<()> {
        let key = unit.key();
        self.start_region(&unit.region, &unit.region_id, 0);

        let idx = match self.unit_index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.unit_index.insert(key.clone(), self.units.len());
                self.units.push(UnitOutcome::new(unit.clone()));
                self.units.len() - 1
            }
        };

        let outcome = &mut self.units[idx];
        let mut status = outcome.status;
        let retry = status == UnitStatus::Error;

        if retry {
            status = UnitStatus::Pending;
        }
        if !status.can_transition_to(UnitStatus::Processing) {
            return Err(SweepError::InvalidTransition {
                unit: key.to_string(),
                from: outcome.status,
                to: UnitStatus::Processing,
            });
        }

        outcome.status = UnitStatus::Processing;
        outcome.attempts += 1;
        outcome.started_at = Some(Utc::now());
        outcome.finished_at = None;

        self.attempts += 1;
        if retry {
            self.retries += 1;
            debug!("Retrying unit {} (attempt {})", key, outcome.attempts);
        }
        self.unit_started.insert(key, Instant::now());

        if let Some(region) = self.region_mut(&unit.region_id) {
            region.attempts += 1;
        }
        self.refresh_region(&unit.region_id);

        Ok(())
    }

    /// Adds the persistence counts of one attempt to a unit
    pub fn record_persistence(&mut self, key: &UnitKey, save: SaveOutcome) {
        let Some(&idx) = self.unit_index.get(key) else {
            return;
        };

        let outcome = &mut self.units[idx];
        outcome.records_found += save.total();
        outcome.records_saved += save.saved;
        outcome.records_duplicate += save.duplicate;
        outcome.records_failed += save.failed;

        let region_id = outcome.unit.region_id.clone();
        if let Some(region) = self.region_mut(&region_id) {
            region.records_found += save.total();
            region.records_saved += save.saved;
            region.records_duplicate += save.duplicate;
            region.records_failed += save.failed;
        }
    }

    /// Ends the current attempt of a unit
    ///
    /// # Arguments
    ///
    /// * `key` - The unit whose attempt ends
    /// * `status` - `Success` or `Error`
    /// * `error` - The failure that ended the attempt, if any
    pub fn finish_unit(
        &mut self,
        key: &UnitKey,
        status: UnitStatus,
        error: Option<&SweepError>,
    ) -> crate::Result<()> {
        let idx = *self
            .unit_index
            .get(key)
            .ok_or_else(|| SweepError::UnknownTarget(format!("unit {}", key)))?;

        let outcome = &mut self.units[idx];
        if !outcome.status.can_transition_to(status) {
            return Err(SweepError::InvalidTransition {
                unit: key.to_string(),
                from: outcome.status,
                to: status,
            });
        }

        outcome.status = status;
        outcome.finished_at = Some(Utc::now());
        outcome.elapsed_ms = self
            .unit_started
            .remove(key)
            .map(|at| at.elapsed().as_millis() as u64)
            .unwrap_or(0);

        let region_id = outcome.unit.region_id.clone();
        let label = outcome.unit.to_string();

        match status {
            UnitStatus::Error => {
                let message = error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unit failed".to_string());
                let failure = error.map(SweepError::detail).unwrap_or_default();

                outcome.error = Some(message.clone());
                outcome.failure = Some(failure.clone());

                if let Some(region) = self.region_mut(&region_id) {
                    region.errors += 1;
                }

                if self.errors.len() < self.error_limit {
                    self.errors.push(ErrorEntry {
                        unit: key.clone(),
                        label,
                        message,
                        failure,
                        at: Utc::now(),
                    });
                } else {
                    self.errors_truncated += 1;
                }
            }
            _ => {
                outcome.error = None;
                outcome.failure = None;
                self.errors.retain(|entry| &entry.unit != key);
            }
        }

        self.refresh_region(&region_id);
        Ok(())
    }

    /// Returns the outcome of a unit
    pub fn unit(&self, key: &UnitKey) -> Option<&UnitOutcome> {
        self.unit_index.get(key).map(|&idx| &self.units[idx])
    }

    /// Returns every unit outcome in the order units were first started
    pub fn units(&self) -> &[UnitOutcome] {
        &self.units
    }

    pub fn region(&self, region_id: &str) -> Option<&RegionOutcome> {
        self.region_index
            .get(region_id)
            .map(|&idx| &self.regions[idx])
    }

    pub fn regions(&self) -> &[RegionOutcome] {
        &self.regions
    }

    /// Units whose latest attempt ended in `Error`
    pub fn failed_units(&self) -> Vec<SubRegionUnit> {
        self.units
            .iter()
            .filter(|outcome| outcome.status.is_error())
            .map(|outcome| outcome.unit.clone())
            .collect()
    }

    /// Computes the run totals
    pub fn global(&self) -> GlobalOutcome {
        let mut global = GlobalOutcome {
            total_regions: self.total_regions.max(self.regions.len()),
            total_units: self.total_units.max(self.units.len()),
            regions_processed: self
                .regions
                .iter()
                .filter(|region| region.finished_at.is_some())
                .count(),
            attempts: self.attempts,
            retries: self.retries,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            errors: self.errors.clone(),
            errors_truncated: self.errors_truncated,
            ..Default::default()
        };

        for outcome in &self.units {
            if outcome.status.is_terminal() {
                global.units_processed += 1;
            }
            match outcome.status {
                UnitStatus::Success => global.units_succeeded += 1,
                UnitStatus::Error => global.units_failed += 1,
                _ => {}
            }
            global.records_found += outcome.records_found;
            global.records_saved += outcome.records_saved;
            global.records_duplicate += outcome.records_duplicate;
            global.records_failed += outcome.records_failed;
        }

        global
    }

    fn region_mut(&mut self, region_id: &str) -> Option<&mut RegionOutcome> {
        let idx = *self.region_index.get(region_id)?;
        Some(&mut self.regions[idx])
    }

    fn refresh_region(&mut self, region_id: &str) {
        let Some(&idx) = self.region_index.get(region_id) else {
            return;
        };

        let mut known = 0;
        let mut processed = 0;
        let mut succeeded = 0;
        let mut failed = 0;
        for outcome in self.units.iter().filter(|o| o.unit.region_id == region_id) {
            known += 1;
            match outcome.status {
                UnitStatus::Success => {
                    processed += 1;
                    succeeded += 1;
                }
                UnitStatus::Error => {
                    processed += 1;
                    failed += 1;
                }
                _ => {}
            }
        }

        let region = &mut self.regions[idx];
        region.total_units = region.total_units.max(known);
        region.units_processed = processed;
        region.units_succeeded = succeeded;
        region.units_failed = failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(sub: &str) -> SubRegionUnit {
        SubRegionUnit::new("Paraná", "PR", format!("Cidade {sub}"), sub)
    }

    fn timeout() -> SweepError {
        SweepError::NavigationTimeout {
            description: "#btn_next1".to_string(),
            selector: Some("#btn_next1".to_string()),
            diagnostics: None,
        }
    }

    fn save(saved: u64, duplicate: u64, failed: u64) -> SaveOutcome {
        SaveOutcome {
            saved,
            duplicate,
            failed,
        }
    }

    #[test]
    fn test_success_counts_roll_up() {
        let mut stats = StatisticsAggregator::new(1, 2, 10);
        stats.start_region("Paraná", "PR", 2);

        for sub in ["1", "2"] {
            let u = unit(sub);
            stats.start_unit(&u).unwrap();
            stats.record_persistence(&u.key(), save(2, 0, 0));
            stats.finish_unit(&u.key(), UnitStatus::Success, None).unwrap();
        }
        stats.finish_region("PR");

        let region = stats.region("PR").unwrap();
        assert_eq!(region.units_processed, 2);
        assert_eq!(region.units_succeeded, 2);
        assert_eq!(region.records_saved, 4);
        assert!(region.finished_at.is_some());

        let global = stats.global();
        assert_eq!(global.regions_processed, 1);
        assert_eq!(global.units_succeeded, 2);
        assert_eq!(global.records_found, 4);
        assert!(global.errors.is_empty());
    }

    #[test]
    fn test_retry_success_replaces_error() {
        let mut stats = StatisticsAggregator::new(1, 1, 10);
        let u = unit("1");

        stats.start_unit(&u).unwrap();
        stats.record_persistence(&u.key(), save(0, 0, 0));
        stats
            .finish_unit(&u.key(), UnitStatus::Error, Some(&timeout()))
            .unwrap();
        assert_eq!(stats.failed_units(), vec![u.clone()]);
        assert_eq!(stats.global().errors.len(), 1);

        stats.start_unit(&u).unwrap();
        stats.record_persistence(&u.key(), save(3, 0, 0));
        stats.finish_unit(&u.key(), UnitStatus::Success, None).unwrap();

        let outcome = stats.unit(&u.key()).unwrap();
        assert_eq!(outcome.status, UnitStatus::Success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.error, None);
        assert_eq!(stats.units().len(), 1);

        let global = stats.global();
        assert_eq!(global.units_processed, 1);
        assert_eq!(global.units_succeeded, 1);
        assert_eq!(global.units_failed, 0);
        assert_eq!(global.retries, 1);
        assert_eq!(global.attempts, 2);
        assert!(global.errors.is_empty());
        assert!(stats.failed_units().is_empty());

        let region = stats.region("PR").unwrap();
        assert_eq!(region.errors, 1);
        assert_eq!(region.units_failed, 0);
    }

    #[test]
    fn test_success_cannot_restart() {
        let mut stats = StatisticsAggregator::new(1, 1, 10);
        let u = unit("1");
        stats.start_unit(&u).unwrap();
        stats.finish_unit(&u.key(), UnitStatus::Success, None).unwrap();

        let err = stats.start_unit(&u).unwrap_err();
        assert!(matches!(
            err,
            SweepError::InvalidTransition {
                from: UnitStatus::Success,
                ..
            }
        ));
    }

    #[test]
    fn test_finish_requires_processing() {
        let mut stats = StatisticsAggregator::new(1, 1, 10);
        let u = unit("1");
        assert!(matches!(
            stats.finish_unit(&u.key(), UnitStatus::Success, None),
            Err(SweepError::UnknownTarget(_))
        ));

        stats.start_unit(&u).unwrap();
        stats.finish_unit(&u.key(), UnitStatus::Error, None).unwrap();
        assert!(stats.finish_unit(&u.key(), UnitStatus::Success, None).is_err());
    }

    #[test]
    fn test_error_log_is_bounded() {
        let mut stats = StatisticsAggregator::new(1, 3, 2);
        for sub in ["1", "2", "3"] {
            let u = unit(sub);
            stats.start_unit(&u).unwrap();
            stats
                .finish_unit(&u.key(), UnitStatus::Error, Some(&timeout()))
                .unwrap();
        }

        let global = stats.global();
        assert_eq!(global.errors.len(), 2);
        assert_eq!(global.errors_truncated, 1);
        assert_eq!(global.units_failed, 3);
        assert_eq!(
            global.errors[0].failure.selector.as_deref(),
            Some("#btn_next1")
        );
    }

    #[test]
    fn test_record_counters_never_decrease() {
        let mut stats = StatisticsAggregator::new(1, 1, 10);
        let u = unit("1");

        stats.start_unit(&u).unwrap();
        stats.record_persistence(&u.key(), save(1, 0, 1));
        stats.finish_unit(&u.key(), UnitStatus::Error, None).unwrap();

        stats.start_unit(&u).unwrap();
        stats.record_persistence(&u.key(), save(0, 1, 0));
        stats.finish_unit(&u.key(), UnitStatus::Success, None).unwrap();

        let outcome = stats.unit(&u.key()).unwrap();
        assert_eq!(outcome.records_found, 3);
        assert_eq!(
            outcome.records_saved + outcome.records_duplicate + outcome.records_failed,
            outcome.records_found
        );
    }

    #[test]
    fn test_region_registered_implicitly() {
        let mut stats = StatisticsAggregator::new(0, 0, 10);
        stats.start_unit(&unit("1")).unwrap();
        stats.start_unit(&unit("2")).unwrap();

        let region = stats.region("PR").unwrap();
        assert_eq!(region.total_units, 2);
        assert_eq!(region.units_processed, 0);
        assert_eq!(stats.global().total_regions, 1);
    }
}
