//! Worker runner
//!
//! Runs a list of units through the unit processor in two passes: the first
//! pass covers every unit, the second replays the units that failed once.
//! Both passes feed the same statistics, so a unit that recovers on the
//! second pass ends up counted as a success.

use super::unit::process_unit;
use crate::driver::BrowserDriver;
use crate::model::SubRegionUnit;
use crate::navigation::{return_to_selector, Session};
use crate::output::StatisticsAggregator;
use crate::state::UnitStatus;
use crate::storage::{PersistenceGateway, RecordSink};
use crate::{Result, SweepError};
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};

/// Drives one worker's units through a single browser session
pub struct WorkerRunner<'a, D, S> {
    session: &'a mut Session<D>,
    gateway: &'a mut PersistenceGateway<S>,
    stats: StatisticsAggregator,
    label: String,

    /// Region whose units the form was last opened for
    current_region: Option<String>,

    /// Set when the page is in an unknown state and must be reloaded
    needs_root: bool,
}

impl<'a, D: BrowserDriver, S: RecordSink> WorkerRunner<'a, D, S> {
    /// Creates a runner
    ///
    /// # Arguments
    ///
    /// * `session` - The page session; it does not need to be on the root page
    /// * `gateway` - Where records are saved
    /// * `stats` - Statistics to update; usually fresh
    /// * `label` - Name used in log lines (e.g. `worker 3`)
    pub fn new(
        session: &'a mut Session<D>,
        gateway: &'a mut PersistenceGateway<S>,
        stats: StatisticsAggregator,
        label: impl Into<String>,
    ) -> Self {
        Self {
            session,
            gateway,
            stats,
            label: label.into(),
            current_region: None,
            needs_root: true,
        }
    }

    pub fn statistics(&self) -> &StatisticsAggregator {
        &self.stats
    }

    pub fn into_statistics(self) -> StatisticsAggregator {
        self.stats
    }

    /// Processes `units` in order, then retries the failures once
    ///
    /// Unit failures are recorded in the statistics and never returned.
    /// Only a fatal error (the browser session is gone) ends the run early;
    /// the statistics gathered so far remain available.
    pub async fn run(&mut self, units: &[SubRegionUnit]) -> Result<()> {
        let units = self.distinct(units);
        let units = units.as_slice();
        self.register_regions(units);

        info!("[{}] Pass 1: {} units", self.label, units.len());
        let failed = self.run_pass(units, 1).await?;

        if !failed.is_empty() {
            info!("[{}] Pass 2: retrying {} failed units", self.label, failed.len());
            let still_failed = self.run_pass(&failed, 2).await?;
            if !still_failed.is_empty() {
                warn!(
                    "[{}] {} units still failing after retry",
                    self.label,
                    still_failed.len()
                );
            }
        }

        for unit in units {
            self.stats.finish_region(&unit.region_id);
        }

        info!("[{}] Finished", self.label);
        Ok(())
    }

    /// Drops repeated units, keeping the first occurrence
    fn distinct(&self, units: &[SubRegionUnit]) -> Vec<SubRegionUnit> {
        let mut seen = HashSet::new();
        units
            .iter()
            .filter(|unit| {
                let fresh = seen.insert(unit.key());
                if !fresh {
                    warn!("[{}] Skipping repeated unit {}", self.label, unit);
                }
                fresh
            })
            .cloned()
            .collect()
    }

    fn register_regions(&mut self, units: &[SubRegionUnit]) {
        let mut order: Vec<&SubRegionUnit> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();

        for unit in units {
            let count = counts.entry(unit.region_id.as_str()).or_insert(0);
            if *count == 0 {
                order.push(unit);
            }
            *count += 1;
        }

        for unit in order {
            let total = counts.get(unit.region_id.as_str()).copied().unwrap_or(0);
            self.stats.start_region(&unit.region, &unit.region_id, total);
        }
    }

    async fn run_pass(&mut self, units: &[SubRegionUnit], pass: u32) -> Result<Vec<SubRegionUnit>> {
        let mut failed = Vec::new();

        for (i, unit) in units.iter().enumerate() {
            info!(
                "[{}] pass {} unit {}/{}: {}",
                self.label,
                pass,
                i + 1,
                units.len(),
                unit
            );
            if !self.run_unit(unit).await? {
                failed.push(unit.clone());
            }

            // close the region once the pass has moved past its last unit,
            // unless some of its units still wait for the second pass
            let region = unit.region_id.as_str();
            let exhausted = units[i + 1..].iter().all(|u| u.region_id != region);
            if exhausted && (pass > 1 || failed.iter().all(|u| u.region_id != region)) {
                self.stats.finish_region(region);
            }
        }

        Ok(failed)
    }

    /// Runs one unit; returns false when it failed and should be retried
    async fn run_unit(&mut self, unit: &SubRegionUnit) -> Result<bool> {
        let key = unit.key();

        if self.needs_root || self.current_region.as_deref() != Some(unit.region_id.as_str()) {
            info!("[{}] Opening the search form for {}", self.label, unit.region);
            if let Err(e) = self.session.open_root().await {
                let e = SweepError::aborted(unit, "open_root", None, e);
                if !self.begin_unit(unit) {
                    return Ok(true);
                }
                self.stats.finish_unit(&key, UnitStatus::Error, Some(&e))?;
                if e.is_fatal() {
                    return Err(e);
                }
                error!("[{}] {}", self.label, e);
                self.needs_root = true;
                return Ok(false);
            }
            self.current_region = Some(unit.region_id.clone());
            self.needs_root = false;
        }

        if !self.begin_unit(unit) {
            return Ok(true);
        }
        let result = process_unit(self.session, self.gateway, unit).await;
        self.stats.record_persistence(&key, result.save);

        match result.error {
            None => {
                self.stats.finish_unit(&key, UnitStatus::Success, None)?;
                self.back_to_form().await?;
                Ok(true)
            }
            Some(e) => {
                self.stats.finish_unit(&key, UnitStatus::Error, Some(&e))?;
                if e.is_fatal() {
                    return Err(e);
                }
                self.recover(unit).await?;
                Ok(false)
            }
        }
    }

    /// Marks a unit as processing; a unit the statistics refuse is skipped
    fn begin_unit(&mut self, unit: &SubRegionUnit) -> bool {
        match self.stats.start_unit(unit) {
            Ok(()) => true,
            Err(e) => {
                warn!("[{}] Skipping {}: {}", self.label, unit, e);
                false
            }
        }
    }

    /// Leaves a finished listing through the alter control, reloading the
    /// root page when that fails
    async fn back_to_form(&mut self) -> Result<()> {
        match return_to_selector(self.session).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("[{}] Could not return to the form: {}", self.label, e);
                self.reload_root().await
            }
        }
    }

    /// Puts the page back on the search form after a failed unit
    async fn recover(&mut self, unit: &SubRegionUnit) -> Result<()> {
        self.reload_root().await?;
        if !self.needs_root {
            self.current_region = Some(unit.region_id.clone());
        }
        Ok(())
    }

    async fn reload_root(&mut self) -> Result<()> {
        match self.session.open_root().await {
            Ok(()) => {
                self.needs_root = false;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("[{}] Could not reload the search form: {}", self.label, e);
                self.needs_root = true;
                Ok(())
            }
        }
    }
}
