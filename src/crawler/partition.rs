//! Work partitioning
//!
//! Units are spread over workers round-robin and handed over through JSON
//! files, one per worker. The retry partition is rebuilt from the units whose
//! latest reported status is `error`.
//!
//! The partitioning functions are pure; file I/O lives in the `save_*`,
//! `load_*` and `read_*` helpers.

use crate::model::{SubRegionUnit, UnitKey};
use crate::output::{UnitOutcome, WorkerReport};
use crate::state::UnitStatus;
use crate::SweepError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

static WORKER_REPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^worker-(\d+)-report\.json$").expect("report name pattern should compile")
});

/// Which run a partition belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionId {
    /// A numbered worker (0-based)
    Worker(usize),

    /// The run that replays failed units
    Retry,

    /// A run started directly from the command line
    Adhoc(String),
}

impl PartitionId {
    /// Name of the file holding the partition's units
    pub fn partition_file(&self) -> String {
        match self {
            Self::Worker(n) => format!("worker-{n}.json"),
            Self::Retry => "worker-retry.json".to_string(),
            Self::Adhoc(label) => format!("sweep-{label}.json"),
        }
    }

    /// Name of the file the run writes its report to
    pub fn report_file(&self) -> String {
        match self {
            Self::Worker(n) => format!("worker-{n}-report.json"),
            Self::Retry => "worker-retry-report.json".to_string(),
            Self::Adhoc(label) => format!("sweep-{label}-report.json"),
        }
    }

    /// Identifier written into the report
    pub fn worker_id(&self) -> String {
        match self {
            Self::Worker(n) => n.to_string(),
            Self::Retry => "retry".to_string(),
            Self::Adhoc(label) => label.clone(),
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker(n) => write!(f, "worker {}", n + 1),
            Self::Retry => write!(f, "retry worker"),
            Self::Adhoc(label) => write!(f, "sweep {}", label),
        }
    }
}

/// The ordered units assigned to one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPartition {
    pub id: PartitionId,
    pub units: Vec<SubRegionUnit>,
}

impl WorkPartition {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Assigns unit `i` to worker `i mod workers`
///
/// Every unit lands in exactly one partition, order within a partition
/// follows the input order, and partition sizes differ by at most one.
/// Always returns `workers` partitions, some possibly empty.
pub fn partition_round_robin(units: &[SubRegionUnit], workers: usize) -> Vec<WorkPartition> {
    let workers = workers.max(1);
    let mut partitions: Vec<WorkPartition> = (0..workers)
        .map(|n| WorkPartition {
            id: PartitionId::Worker(n),
            units: Vec::new(),
        })
        .collect();

    for (i, unit) in units.iter().enumerate() {
        partitions[i % workers].units.push(unit.clone());
    }

    partitions
}

/// Collects the units whose latest outcome is `error`
///
/// Outcomes are read in order and a later outcome for the same unit replaces
/// an earlier one, so a unit that failed in a worker run and succeeded in a
/// previous retry run is not retried again. Units keep the order in which
/// they were first seen.
pub fn build_retry_partition<'a, I>(outcomes: I) -> WorkPartition
where
    I: IntoIterator<Item = &'a UnitOutcome>,
{
    let mut order: Vec<UnitKey> = Vec::new();
    let mut latest: HashMap<UnitKey, (&SubRegionUnit, UnitStatus)> = HashMap::new();

    for outcome in outcomes {
        let key = outcome.unit.key();
        if !latest.contains_key(&key) {
            order.push(key.clone());
        }
        latest.insert(key, (&outcome.unit, outcome.status));
    }

    let units = order
        .iter()
        .filter_map(|key| latest.get(key))
        .filter(|(_, status)| status.is_error())
        .map(|(unit, _)| (*unit).clone())
        .collect();

    WorkPartition {
        id: PartitionId::Retry,
        units,
    }
}

/// Writes one partition file into `dir`
pub fn save_partition(dir: &Path, partition: &WorkPartition) -> Result<PathBuf, SweepError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(partition.id.partition_file());
    let json = serde_json::to_string_pretty(&partition.units)?;
    std::fs::write(&path, json)?;

    info!(
        "{}: {} units saved to {}",
        partition.id,
        partition.len(),
        path.display()
    );
    Ok(path)
}

/// Writes every partition file into `dir`
pub fn save_partitions(dir: &Path, partitions: &[WorkPartition]) -> Result<Vec<PathBuf>, SweepError> {
    partitions
        .iter()
        .map(|partition| save_partition(dir, partition))
        .collect()
}

/// Loads the units of a partition
///
/// # Arguments
///
/// * `dir` - Directory holding partition files
/// * `id` - The partition to load
/// * `file_override` - File name to read instead of the partition's default
///   one; blank names are ignored
pub fn load_partition(
    dir: &Path,
    id: PartitionId,
    file_override: Option<&str>,
) -> Result<WorkPartition, SweepError> {
    let file_name = match file_override.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => id.partition_file(),
    };
    let path = dir.join(file_name);

    if !path.exists() {
        return Err(SweepError::Partition(format!(
            "partition file for {} not found: {}",
            id,
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let units: Vec<SubRegionUnit> = serde_json::from_str(&content)?;
    Ok(WorkPartition { id, units })
}

/// Reads every worker report in `dir`
///
/// Numbered worker reports come first in worker order; a previous retry
/// report, if any, comes last so that its statuses take precedence.
/// Unreadable reports are skipped with a warning.
pub fn read_reports(dir: &Path) -> Result<Vec<WorkerReport>, SweepError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut numbered: Vec<(usize, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(n) = WORKER_REPORT
            .captures(name)
            .and_then(|caps| caps[1].parse::<usize>().ok())
        {
            numbered.push((n, path.clone()));
        }
    }
    numbered.sort_by_key(|(n, _)| *n);

    let mut paths: Vec<PathBuf> = numbered.into_iter().map(|(_, path)| path).collect();
    let retry = dir.join(PartitionId::Retry.report_file());
    if retry.exists() {
        paths.push(retry);
    }

    let mut reports = Vec::new();
    for path in paths {
        match WorkerReport::load(&path) {
            Ok(report) => reports.push(report),
            Err(e) => warn!("Skipping unreadable report {}: {}", path.display(), e),
        }
    }
    Ok(reports)
}

/// Checks that partitions cover `units` exactly once
pub fn is_exact_cover(units: &[SubRegionUnit], partitions: &[WorkPartition]) -> bool {
    let mut seen = HashSet::new();
    let total: usize = partitions.iter().map(WorkPartition::len).sum();

    total == units.len()
        && partitions
            .iter()
            .flat_map(|p| p.units.iter())
            .all(|unit| seen.insert(unit.key()))
        && units.iter().all(|unit| seen.contains(&unit.key()))
}
