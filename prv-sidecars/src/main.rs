//! prv-sidecars - write BIDS sidecars for a reorganized PRV tree
//!
//! Scans the output tree produced by prv-reorg and writes every sidecar kind
//! next to the recordings. Exits non-zero when any sidecar failed or any
//! session was rejected.

use anyhow::{Context, Result};
use clap::Parser;
use prv_common::config::{ConfigLoader, ConfigSource};
use prv_common::LogHandle;
use prv_sidecars::{EdfHeaderSource, HierarchyScanner, PlaceholderSource, SidecarGenerator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "prv-sidecars")]
#[command(about = "Generate BIDS sidecar files for a reorganized PRV session tree")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of the reorganized tree
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip EDF headers and write placeholder metadata
    #[arg(long)]
    placeholder_metadata: bool,

    /// Also write dataset_description.json for each dataset
    #[arg(long)]
    dataset_description: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let loaded = ConfigLoader::new(args.config.clone())
        .load()
        .context("Failed to load configuration")?;
    let mut config = loaded.config;
    if args.dataset_description {
        config.sidecar.dataset_description = true;
    }

    let log = LogHandle::init("prv-sidecars", &config.logging)
        .context("Failed to initialize logging")?;
    if let Some(path) = log.log_file() {
        info!("Logging to {}", path.display());
    }

    info!("Starting prv-sidecars v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", loaded.source);
    if loaded.source == ConfigSource::Defaults {
        warn!("No configuration file found, using compiled defaults");
    }

    let output_dir = config.resolve_output_dir(args.output.as_deref());
    info!("Output: {}", output_dir.display());

    let scan = HierarchyScanner::new(config.sidecar.signal_file_policy, log.clone())
        .scan(&output_dir)
        .with_context(|| format!("Failed to scan {}", output_dir.display()))?;
    info!("Found {} sessions", scan.sessions.len());

    let generator = if args.placeholder_metadata {
        info!("Using placeholder signal metadata");
        SidecarGenerator::new(config.sidecar, config.sessions, PlaceholderSource, log.clone())
    } else {
        SidecarGenerator::new(
            config.sidecar,
            config.sessions,
            EdfHeaderSource::new(log.clone()),
            log.clone(),
        )
    };
    let summary = generator.generate(&scan, &output_dir);

    println!();
    println!("Sidecar summary");
    println!("  Sessions:  {}", scan.sessions.len());
    for line in summary.lines() {
        println!("  {}", line);
    }
    for rejected in &scan.rejected {
        println!(
            "    rejected sub-PRV-{} age {}: {} signal files in {}",
            rejected.patient_id,
            rejected.age_months,
            rejected.signal_files.len(),
            rejected.eeg_dir.display()
        );
    }

    if summary.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Sidecar generation finished with failures");
        Ok(ExitCode::FAILURE)
    }
}
