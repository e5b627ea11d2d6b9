//! Command-line front end for the gunshot localizer
//!
//! Reads measured arrival delays from a JSON file and prints the estimated
//! event location for the configured microphone deployment.

use clap::{Parser, Subcommand, ValueEnum};
use gunshot_localization::api::{CsvFormatter, JsonFormatter, Localizer, TextFormatter};
use gunshot_localization::core::{DelayReading, SensorReadings};
use gunshot_localization::utils::LocalizerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gunshot-localize")]
#[command(version)]
#[command(about = "Locate acoustic events from microphone arrival delays", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Deployment configuration (JSON); the built-in deployment when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Localize an event from a JSON file of delay readings
    Locate {
        /// File of the form {"readings": [{"sensor_id": 1, "time_delay_s": 0.0}, ...]}
        readings: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Include solver diagnostics in text output
        #[arg(short, long)]
        diagnostics: bool,
    },

    /// List the surveyed microphone positions
    Mics,

    /// Write the active configuration to a file
    InitConfig {
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Csv,
}

#[derive(Deserialize)]
struct ReadingsJson {
    readings: Vec<DelayReading>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(&cli.log_level))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Locate {
            readings,
            format,
            diagnostics,
        } => locate(config, &readings, format, diagnostics),
        Commands::Mics => {
            let localizer = Localizer::new(config)?;
            for (id, position) in &localizer.sensor_positions().0 {
                let marker = if *id == localizer.reference_sensor() { " (reference)" } else { "" };
                println!("{}: lat={:.8}, lng={:.8}{}", id, position.latitude, position.longitude, marker);
            }
            Ok(())
        }
        Commands::InitConfig { output } => {
            config.save_to_file(&output)?;
            println!("Configuration written to {}", output.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<LocalizerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(LocalizerConfig::from_file(path)?),
        None => Ok(LocalizerConfig::default()),
    }
}

fn locate(
    config: LocalizerConfig,
    readings_path: &Path,
    format: Format,
    diagnostics: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let localizer = Localizer::new(config)?;

    let json_data = std::fs::read_to_string(readings_path)?;
    let readings: ReadingsJson = serde_json::from_str(&json_data)?;

    let result = localizer.localize(SensorReadings::Delays(readings.readings))?;

    match format {
        Format::Text => {
            let mut formatter = TextFormatter::new();
            if diagnostics {
                formatter = formatter.with_diagnostics();
            }
            print!("{}", formatter.format_text(&result));
        }
        Format::Json => println!("{}", JsonFormatter::pretty().format_json(&result)?),
        Format::Csv => {
            let formatter = CsvFormatter::new();
            if formatter.include_header {
                println!("{}", formatter.header());
            }
            println!("{}", formatter.format_csv(&result));
        }
    }

    Ok(())
}
