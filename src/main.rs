//! Market Pulse
//!
//! Refreshes the market indicator snapshot once and exits. Partial indicator
//! failures are logged and do not change the exit code.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_pulse::{run, Config};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "market-pulse")]
#[command(about = "Refresh the market indicator snapshot", long_about = None)]
struct Args {
    /// Path to a YAML configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the snapshot and manual override files
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Config::from_file(path).context("Failed to load configuration")?
        }
        None => Config::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    info!("Refreshing {} indicators", config.indicators.len());
    let summary = run(&config).await?;
    info!("Refresh complete: {}", summary.output_path.display());
    Ok(())
}
