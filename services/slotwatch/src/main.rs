//! Slotwatch CLI
//!
//! Command-line interface for the hospital reservation slot watcher.

use std::path::PathBuf;

use clap::Parser;
use slotwatch::config::parse_months;
use slotwatch::{load_config, Config};
use tracing::Level;

#[derive(Parser)]
#[command(name = "slotwatch")]
#[command(about = "Hospital reservation slot monitoring and notification service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target year (overrides config file)
    #[arg(long)]
    year: Option<i32>,

    /// Target months, space- or comma-separated (overrides config file)
    #[arg(long)]
    months: Option<String>,

    /// Run a single polling cycle and exit
    #[arg(long)]
    once: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(year) = args.year {
        config.target.year = year;
    }
    if let Some(months) = &args.months {
        config.target.months = parse_months(months)?;
    }

    config.validate()?;
    config.resolve_secrets()?;

    tracing::info!("Starting slotwatch service");
    tracing::debug!(
        "Target: dept {} dr {} year {} months {:?}, notifiers: {}",
        config.target.dept_cd,
        config.target.dr_cd,
        config.target.year,
        config.target.months,
        config.notifiers.len()
    );

    slotwatch::run(config, args.once).await?;

    Ok(())
}
