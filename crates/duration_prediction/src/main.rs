//! Taxi Ride Duration Batch Scoring
//!
//! Scores one month of taxi trips with the fitted duration model and
//! writes one prediction per ride.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use config::SETTINGS;
use duration_prediction::commands;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Taxi Ride Duration Batch Scoring
#[derive(Parser)]
#[command(name = "duration-prediction")]
#[command(about = "Scores a month of taxi trips with the ride duration model")]
#[command(version)]
struct Cli {
    /// Year of the trip data (e.g., 2021)
    #[arg(allow_negative_numbers = true)]
    year: i64,

    /// Month of the trip data (1-12)
    #[arg(allow_negative_numbers = true)]
    month: i64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the model artifact (overrides `MODEL_PATH`)
    #[arg(short, long, value_name = "PATH")]
    model: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut settings = SETTINGS.clone();
    if let Some(model) = cli.model {
        settings.model_path = model;
    }

    let summary = commands::batch::run(&settings, cli.year, cli.month).await?;
    info!(
        rides = summary.rides_scored,
        output_file = %summary.output_file,
        "Batch completed successfully"
    );

    Ok(())
}
