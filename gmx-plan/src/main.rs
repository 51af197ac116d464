//! gmx-plan - dispense planning CLI
//!
//! Builds the ordered dispense plan for a batch document and writes it as
//! JSON for the pipetting robot.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gmx_common::config::{write_toml_config, ConfigResolver, TomlConfig};
use gmx_plan::Batch;
use std::path::PathBuf;
use tracing::info;

/// Command-line arguments for gmx-plan
#[derive(Parser, Debug)]
#[command(name = "gmx-plan")]
#[command(about = "Plan gravimetric dispense volumes for formulation batches")]
#[command(version)]
struct Args {
    /// Configuration file (overrides GMX_CONFIG and the user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the dispense plan for a batch
    Plan {
        /// Batch document (species table + design table)
        #[arg(short, long)]
        batch: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Per-transfer ceiling in mL (overrides config)
        #[arg(long)]
        max_volume: Option<f64>,
    },
    /// Write the default configuration to a file
    InitConfig {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::InitConfig { path } = &args.command {
        init_tracing("info");
        write_toml_config(&TomlConfig::default(), path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let (mut config, source) = ConfigResolver::new()
        .resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config.logging.level);
    info!("Configuration source: {:?}", source);

    if let Command::Plan {
        batch,
        output,
        max_volume,
    } = args.command
    {
        if let Some(v_max) = max_volume {
            config.plan.max_transfer_volume = v_max;
        }

        let document = Batch::load(&batch)
            .with_context(|| format!("Failed to read batch {}", batch.display()))?;
        let prepared = document
            .prepare(&config.plan)
            .context("Failed to build dispense plan")?;

        let json = serde_json::to_string_pretty(&prepared.plan)?;
        match output {
            Some(path) => {
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Plan written to {}", path.display());
            }
            None => println!("{}", json),
        }
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
