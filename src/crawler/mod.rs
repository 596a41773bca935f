//! Crawler module for sweeping units of work
//!
//! This module contains the core sweep logic, including:
//! - Processing one unit (select, paginate, open items, extract, persist)
//! - Running a worker's units in two passes
//! - Partitioning units among workers and rebuilding the retry partition
//! - The run modes exposed by the binary

mod modes;
mod partition;
mod unit;
mod worker;

pub use modes::{enumerate_universe, find_unit, run_mode, units_from, units_in_region, RunMode};
pub use partition::{
    build_retry_partition, is_exact_cover, load_partition, partition_round_robin, read_reports,
    save_partition, save_partitions, PartitionId, WorkPartition,
};
pub use unit::{process_unit, UnitResult};
pub use worker::WorkerRunner;
