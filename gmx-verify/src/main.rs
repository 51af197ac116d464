//! gmx-verify - gravimetric verification CLI
//!
//! Rebuilds the dispense plan for a batch, segments the balance trace that
//! was recorded while the robot ran it and reports planned against actual
//! volumes.

use anyhow::{Context, Result};
use clap::Parser;
use gmx_common::config::ConfigResolver;
use gmx_plan::Batch;
use gmx_verify::{apply_to_ledgers, ManualSchedule, MassTrace, SegmentationEngine, VerificationReport};
use std::path::PathBuf;
use tracing::{info, warn};

/// Command-line arguments for gmx-verify
#[derive(Parser, Debug)]
#[command(name = "gmx-verify")]
#[command(about = "Verify dispensed volumes against a recorded balance trace")]
#[command(version)]
struct Args {
    /// Configuration file (overrides GMX_CONFIG and the user config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Batch document the run was planned from
    #[arg(short, long)]
    batch: PathBuf,

    /// Balance trace CSV with Time and Mass columns
    #[arg(short, long)]
    trace: PathBuf,

    /// Operator timestamps replacing automatic detection
    #[arg(short, long)]
    manual: Option<PathBuf>,

    /// Report JSON output (stdout if omitted)
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Actual composition table keyed by sample ID
    #[arg(long)]
    fractions: Option<PathBuf>,

    /// Per-step table
    #[arg(long)]
    steps: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (config, source) = ConfigResolver::new()
        .resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config.logging.level);
    info!("Configuration source: {:?}", source);

    let batch = Batch::load(&args.batch)
        .with_context(|| format!("Failed to read batch {}", args.batch.display()))?;
    let mut prepared = batch
        .prepare(&config.plan)
        .context("Failed to build dispense plan")?;

    let trace = MassTrace::load_csv(&args.trace)
        .with_context(|| format!("Failed to read trace {}", args.trace.display()))?;
    info!("Loaded {} trace samples", trace.len());

    let manual = match &args.manual {
        Some(path) => Some(
            ManualSchedule::load(path)
                .with_context(|| format!("Failed to read schedule {}", path.display()))?,
        ),
        None => None,
    };

    let mut engine = SegmentationEngine::new(&trace, &config.detection)
        .context("Invalid detection parameters")?;
    let outcome = engine
        .verify(
            &mut prepared.plan,
            &prepared.samples,
            &prepared.registry,
            manual.as_ref(),
        )
        .context("Verification aborted")?;
    apply_to_ledgers(&prepared.plan, &outcome, &mut prepared.samples)
        .context("Failed to update sample ledgers")?;

    let report = VerificationReport::build(&prepared.plan, &outcome, &prepared.samples);
    if report.failed_steps() > 0 {
        warn!("{} steps could not be located", report.failed_steps());
    }

    match &args.report {
        Some(path) => {
            report
                .save_json(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    if let Some(path) = &args.fractions {
        report
            .save_fractions_csv(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(path) = &args.steps {
        report
            .save_steps_csv(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}

/// RUST_LOG wins over the configured level; logs go to stderr
fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
