use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use ap_locator::{Batch, BatchProcessor, EngineConfig, EstimationMethod, LocatorResult, PositioningEngine};

#[derive(Parser)]
#[command(name = "ap-locator")]
#[command(about = "Estimate access point positions from signal observations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate every access point touched by a JSON batch
    Estimate {
        /// Batch of known access points and new scans
        #[arg(short, long)]
        input: PathBuf,
        /// Engine configuration; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write outcomes here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the default engine configuration
    DefaultConfig,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Estimate { input, config, output } => estimate(&input, config.as_deref(), output.as_deref()),
        Commands::DefaultConfig => default_config(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn estimate(input: &Path, config: Option<&Path>, output: Option<&Path>) -> LocatorResult<()> {
    let config = match config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let batch = Batch::from_file(input)?;
    log::info!("loaded {} access points and {} scans", batch.access_points.len(), batch.scans.len());

    let processor = BatchProcessor::new(PositioningEngine::new(config));
    let outcomes = processor.process(batch);

    let located = outcomes.iter().filter(|o| o.method != EstimationMethod::None).count();
    log::info!("{} of {} access points located", located, outcomes.len());

    let json = serde_json::to_string_pretty(&outcomes)?;
    match output {
        Some(path) => fs::write(path, json)?,
        None => println!("{}", json),
    }
    Ok(())
}

fn default_config() -> LocatorResult<()> {
    println!("{}", serde_json::to_string_pretty(&EngineConfig::default())?);
    Ok(())
}
