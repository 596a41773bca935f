//! Leilao-Sweep main entry point
//!
//! This is the command-line interface for the property-auction sweeper.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leilao_sweep::config::load_config_with_hash;
use leilao_sweep::crawler::RunMode;
use leilao_sweep::output::{print_report, WorkerReport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Leilao-Sweep: sweeps a property-auction search site unit by unit
///
/// Every sub-region of every region is selected in the search form, its
/// listing pages are walked, and each property's detail page is extracted
/// and stored in SQLite. Work can be divided among several worker processes
/// and failed units can be retried from the workers' reports.
#[derive(Parser, Debug)]
#[command(name = "leilao-sweep")]
#[command(version = "1.0.0")]
#[command(about = "A property-auction sweeper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sweep every unit of every region
    All {
        /// Region to start from
        #[arg(long)]
        start_region: Option<String>,

        /// Sub-region to start from
        #[arg(long)]
        start_unit: Option<String>,
    },

    /// Sweep every unit of one region
    Region {
        #[arg(value_name = "REGION")]
        region_id: String,
    },

    /// Sweep a single unit
    Unit {
        #[arg(value_name = "REGION")]
        region_id: String,

        #[arg(value_name = "UNIT")]
        unit_id: String,
    },

    /// Enumerate every unit and write one partition file per worker
    Divide,

    /// Sweep the units of one partition (workers are numbered from 0)
    Worker {
        #[arg(value_name = "N")]
        id: usize,

        /// Partition file to read instead of the default worker-N.json
        #[arg(long, env = "WORKER_FILE")]
        partition_file: Option<String>,
    },

    /// Sweep again every unit that ended in error in earlier worker runs
    Retry,

    /// Print a saved worker report and exit
    Report {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

impl Command {
    fn into_mode(self) -> Option<RunMode> {
        match self {
            Command::All {
                start_region,
                start_unit,
            } => Some(RunMode::All {
                start_region,
                start_unit,
            }),
            Command::Region { region_id } => Some(RunMode::Region(region_id)),
            Command::Unit { region_id, unit_id } => Some(RunMode::Unit { region_id, unit_id }),
            Command::Divide => Some(RunMode::Divide),
            Command::Worker { id, partition_file } => Some(RunMode::Worker { id, partition_file }),
            Command::Retry => Some(RunMode::Retry),
            Command::Report { .. } => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if let Command::Report { file } = &cli.command {
        let report = WorkerReport::load(file)
            .with_context(|| format!("Failed to read report {}", file.display()))?;
        print_report(&report);
        return Ok(());
    }

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let Some(mode) = cli.command.into_mode() else {
        return Ok(());
    };
    handle_sweep(config, config_hash, mode).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("leilao_sweep=info,warn"),
            1 => EnvFilter::new("leilao_sweep=debug,info"),
            2 => EnvFilter::new("leilao_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Launches the browser and runs one mode
#[cfg(feature = "browser")]
async fn handle_sweep(
    config: leilao_sweep::config::Config,
    config_hash: String,
    mode: RunMode,
) -> Result<()> {
    use leilao_sweep::crawler::run_mode;
    use leilao_sweep::driver::ChromiumDriver;

    let driver = ChromiumDriver::launch(&config.browser)
        .await
        .context("Failed to start the browser")?;

    match run_mode(&config, &config_hash, driver, mode).await {
        Ok(Some(report)) => {
            print_report(&report);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::error!("Sweep failed in {}: {}", e.detail().function, e);
            Err(e.into())
        }
    }
}

#[cfg(not(feature = "browser"))]
async fn handle_sweep(
    _config: leilao_sweep::config::Config,
    _config_hash: String,
    mode: RunMode,
) -> Result<()> {
    anyhow::bail!(
        "{:?} needs a browser; rebuild with `--features browser`",
        mode
    )
}
