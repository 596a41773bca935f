//! Run modes
//!
//! Every mode that processes units funnels them through the worker runner,
//! so they all get the retry pass, region amortization and a report file.

use super::partition::{
    build_retry_partition, is_exact_cover, load_partition, partition_round_robin, read_reports,
    save_partition, save_partitions, PartitionId, WorkPartition,
};
use super::worker::WorkerRunner;
use crate::config::Config;
use crate::driver::BrowserDriver;
use crate::model::SubRegionUnit;
use crate::navigation::{enumerate_units, Session, Timings};
use crate::output::{StatisticsAggregator, WorkerReport};
use crate::storage::{open_sink, PersistenceGateway};
use crate::{Result, SweepError};
use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// What a process invocation should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Sweep every unit, optionally starting at a given region/sub-region
    All {
        start_region: Option<String>,
        start_unit: Option<String>,
    },

    /// Sweep every unit of one region
    Region(String),

    /// Sweep a single unit
    Unit { region_id: String, unit_id: String },

    /// Enumerate all units and write one partition file per worker
    Divide,

    /// Sweep the units of one partition file
    Worker {
        id: usize,
        partition_file: Option<String>,
    },

    /// Rebuild and sweep the units that failed in earlier worker runs
    Retry,
}

/// Units from a start position to the end of the universe
///
/// With a start region, units before the region's first unit are skipped;
/// with a start sub-region too, units before that sub-region (searched from
/// the start region on) are skipped as well. Identifiers that are not found
/// are logged and the whole universe is returned.
pub fn units_from(
    universe: &[SubRegionUnit],
    start_region: Option<&str>,
    start_unit: Option<&str>,
) -> Vec<SubRegionUnit> {
    let region_start = match start_region {
        Some(id) => match universe.iter().position(|u| u.region_id == id) {
            Some(pos) => pos,
            None => {
                warn!("Start region {} not found; processing every unit", id);
                return universe.to_vec();
            }
        },
        None => 0,
    };

    let start = match start_unit {
        Some(id) => match universe[region_start..]
            .iter()
            .position(|u| u.sub_region.id == id)
        {
            Some(pos) => region_start + pos,
            None => {
                warn!("Start sub-region {} not found; processing every unit", id);
                return universe.to_vec();
            }
        },
        None => region_start,
    };

    if start > 0 {
        info!("Skipping {} units before the start position", start);
    }
    universe[start..].to_vec()
}

/// Units of one region
pub fn units_in_region(universe: &[SubRegionUnit], region_id: &str) -> Result<Vec<SubRegionUnit>> {
    let units: Vec<SubRegionUnit> = universe
        .iter()
        .filter(|u| u.region_id == region_id)
        .cloned()
        .collect();

    if units.is_empty() {
        return Err(SweepError::UnknownTarget(format!("region {region_id}")));
    }
    Ok(units)
}

/// The unit with the given identifiers
pub fn find_unit(universe: &[SubRegionUnit], region_id: &str, unit_id: &str) -> Result<SubRegionUnit> {
    universe
        .iter()
        .find(|u| u.region_id == region_id && u.sub_region.id == unit_id)
        .cloned()
        .ok_or_else(|| SweepError::UnknownTarget(format!("unit {unit_id} of region {region_id}")))
}

/// Loads the search form, lists every unit and resets the form
pub async fn enumerate_universe<D: BrowserDriver>(
    session: &mut Session<D>,
) -> Result<Vec<SubRegionUnit>> {
    session.open_root().await?;
    let units = enumerate_units(session).await?;
    session.reload().await?;
    Ok(units)
}

/// Runs one mode to completion
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `config_hash` - Hash of the configuration file, written into reports
/// * `driver` - The browser driver; it is closed before returning
/// * `mode` - What to do
///
/// # Returns
///
/// * `Ok(Some(report))` - Units were processed and a report was written
/// * `Ok(None)` - The mode had nothing to process (e.g. `divide`)
/// * `Err(SweepError)` - Setup failed, a target was unknown, or the browser
///   session died; in the last case the report is still written
pub async fn run_mode<D: BrowserDriver>(
    config: &Config,
    config_hash: &str,
    driver: D,
    mode: RunMode,
) -> Result<Option<WorkerReport>> {
    let timings = Timings::from(&config.navigation);
    let mut session = Session::new(driver, timings, config.site.base_url.clone());

    let outcome = dispatch(&mut session, config, config_hash, mode).await;

    if let Err(e) = session.close().await {
        debug!("Closing the browser session failed: {}", e);
    }
    outcome
}

async fn dispatch<D: BrowserDriver>(
    session: &mut Session<D>,
    config: &Config,
    config_hash: &str,
    mode: RunMode,
) -> Result<Option<WorkerReport>> {
    let partition_dir = Path::new(&config.workers.partition_dir);

    let partition = match mode {
        RunMode::All {
            start_region,
            start_unit,
        } => {
            let universe = enumerate_universe(session).await?;
            WorkPartition {
                id: PartitionId::Adhoc("all".to_string()),
                units: units_from(&universe, start_region.as_deref(), start_unit.as_deref()),
            }
        }
        RunMode::Region(region_id) => {
            let universe = enumerate_universe(session).await?;
            WorkPartition {
                units: units_in_region(&universe, &region_id)?,
                id: PartitionId::Adhoc(format!("region-{region_id}")),
            }
        }
        RunMode::Unit { region_id, unit_id } => {
            let universe = enumerate_universe(session).await?;
            WorkPartition {
                units: vec![find_unit(&universe, &region_id, &unit_id)?],
                id: PartitionId::Adhoc(format!("unit-{region_id}-{unit_id}")),
            }
        }
        RunMode::Divide => {
            divide(session, config).await?;
            return Ok(None);
        }
        RunMode::Worker { id, partition_file } => {
            load_partition(partition_dir, PartitionId::Worker(id), partition_file.as_deref())?
        }
        RunMode::Retry => {
            let reports = read_reports(Path::new(&config.output.report_dir))?;
            let retry = build_retry_partition(reports.iter().flat_map(|r| r.units.iter()));
            if retry.is_empty() {
                warn!("No failed units found in {} reports; nothing to retry", reports.len());
                return Ok(None);
            }
            save_partition(partition_dir, &retry)?;
            retry
        }
    };

    run_partition(session, config, config_hash, partition)
        .await
        .map(Some)
}

/// Enumerates every unit and writes one partition file per worker
async fn divide<D: BrowserDriver>(session: &mut Session<D>, config: &Config) -> Result<()> {
    let universe = enumerate_universe(session).await?;
    info!("Dividing {} units among {} workers", universe.len(), config.workers.count);

    let partitions = partition_round_robin(&universe, config.workers.count);
    if !is_exact_cover(&universe, &partitions) {
        return Err(SweepError::Partition(
            "enumeration produced the same unit more than once".to_string(),
        ));
    }
    save_partitions(Path::new(&config.workers.partition_dir), &partitions)?;

    for partition in &partitions {
        info!("  {}: {} units", partition.id, partition.len());
    }
    Ok(())
}

/// Runs one partition through the worker runner and writes its report
async fn run_partition<D: BrowserDriver>(
    session: &mut Session<D>,
    config: &Config,
    config_hash: &str,
    partition: WorkPartition,
) -> Result<WorkerReport> {
    if partition.is_empty() {
        warn!("{} has no units to process", partition.id);
    } else {
        info!("{} loaded {} units", partition.id, partition.len());
    }

    let sink = open_sink(Path::new(&config.output.database_path))?;
    let mut gateway = PersistenceGateway::new(sink);

    let regions: HashSet<&str> = partition
        .units
        .iter()
        .map(|u| u.region_id.as_str())
        .collect();
    let stats = StatisticsAggregator::new(
        regions.len(),
        partition.len(),
        config.output.error_log_limit,
    );

    let started_at = Utc::now();
    let label = partition.id.to_string();
    let mut runner = WorkerRunner::new(session, &mut gateway, stats, label.clone());
    let outcome = runner.run(&partition.units).await;
    let stats = runner.into_statistics();

    let report = WorkerReport::from_statistics(
        &partition.id.worker_id(),
        &label,
        config_hash,
        started_at,
        &stats,
    );
    let path = Path::new(&config.output.report_dir).join(partition.id.report_file());
    report.write_to(&path)?;
    info!("Report saved to {}", path.display());

    outcome?;
    Ok(report)
}
