//! prv-reorg - copy flat PRV recordings into the session tree
//!
//! Reads the allow-list, parses every `.edf`/`.xml` name in the input
//! directory and copies allow-listed files to their canonical location.
//! Exits non-zero when any file could not be placed.

use anyhow::{Context, Result};
use clap::Parser;
use prv_common::config::{ConfigLoader, ConfigSource};
use prv_common::LogHandle;
use prv_reorg::{discover, AllowList, HierarchyBuilder};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "prv-reorg")]
#[command(about = "Reorganize flat PRV EEG files into a BIDS-like session tree")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Flat directory of source .edf/.xml files
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Root of the reorganized tree
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// CSV with a patient_identifier column
    #[arg(short, long)]
    allow_list: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let loaded = ConfigLoader::new(args.config.clone())
        .load()
        .context("Failed to load configuration")?;
    let config = loaded.config;

    let log = LogHandle::init("prv-reorg", &config.logging)
        .context("Failed to initialize logging")?;
    if let Some(path) = log.log_file() {
        info!("Logging to {}", path.display());
    }

    info!("Starting prv-reorg v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", loaded.source);
    if loaded.source == ConfigSource::Defaults {
        warn!("No configuration file found, using compiled defaults");
    }

    let input_dir = config.resolve_input_dir(args.input.as_deref());
    let output_dir = config.resolve_output_dir(args.output.as_deref());
    let allow_list_path = config.resolve_allow_list(args.allow_list.as_deref());
    info!("Input: {}", input_dir.display());
    info!("Output: {}", output_dir.display());

    // Step 1: allow-list (fatal if unusable)
    let allow_list = AllowList::from_csv_path(&allow_list_path)?;
    info!(
        "Found {} patient identifiers: {:?}",
        allow_list.len(),
        allow_list.iter().collect::<Vec<_>>()
    );

    // Step 2: parse the flat input directory
    let discovery = discover(&input_dir)?;

    // Step 3: copy into the session tree
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    let report = HierarchyBuilder::new(&allow_list).build(&discovery.identities, &input_dir, &output_dir);

    println!();
    println!("Reorganization summary");
    println!("  Patients:       {}", report.patients.len());
    println!("  Sessions:       {}", report.sessions);
    println!("  Files copied:   {}", report.copied.len());
    println!("  Files skipped:  {}", discovery.skipped.len());
    println!("  Not allowed:    {}", report.excluded.len());
    println!("  Failures:       {}", report.failures.len());
    for skipped in &discovery.skipped {
        println!("    skipped {}: {}", skipped.filename, skipped.reason);
    }
    for failure in &report.failures {
        println!("    failed {}: {}", failure.source.display(), failure.error);
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("{} file(s) could not be placed", report.failures.len());
        Ok(ExitCode::FAILURE)
    }
}
