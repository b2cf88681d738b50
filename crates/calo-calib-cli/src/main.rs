//! Calo Calib CLI - cluster imaging and calibrated-energy inference
//!
//! Host loop around the calibration pipeline: reads events, feeds their
//! clusters through the model one at a time and writes one row per cluster.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::inspect::InspectCommand;
use commands::model_info::ModelInfoCommand;
use commands::run::RunCommand;

#[derive(Parser)]
#[command(
    name = "calo-calib",
    version,
    about = "Calorimeter cluster imaging and energy calibration",
    long_about = "Builds fixed-shape calorimeter images for every cluster and predicts its\n\
                  calibrated energy with an ONNX regression model.",
    after_help = "EXAMPLES:\n  \
                  # Calibrate all clusters of an event file\n  \
                  calo-calib run --config config/calibration.yaml --input events.json --output rows.jsonl\n\n  \
                  # Batched inference, 32 clusters per call\n  \
                  calo-calib run --input events.json --output rows.jsonl --batch-size 32\n\n  \
                  # Look at the images of one cluster\n  \
                  calo-calib inspect --input events.json --event 0 --cluster 2\n\n  \
                  # Show model inputs and outputs\n  \
                  calo-calib model-info --model models/energy-regression/cluster_calib.onnx"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the calibration over an event file
    Run(RunCommand),

    /// Build and summarize the images of one cluster (no model needed)
    Inspect(InspectCommand),

    /// Print the model's input and output tensors
    ModelInfo(ModelInfoCommand),
}

fn build_subscriber(verbose: bool) -> FmtSubscriber {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing::subscriber::set_global_default(build_subscriber(cli.verbose))
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Run(cmd) => cmd.execute(),
        Commands::Inspect(cmd) => cmd.execute(),
        Commands::ModelInfo(cmd) => cmd.execute(),
    }
}
