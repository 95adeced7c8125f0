//! homemon - one-shot home data collection runs
//!
//! Subcommands:
//! - `sensor [SCRIPT...]`: read the Bluetooth room sensors
//! - `weather [--days N]`: poll OpenWeatherMap
//! - `broadband`: merge speed-test exports into the master table
//! - `verify`: check every external collaborator

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use homemon_service::config::{Config, MAX_FORECAST_DAYS};
use homemon_service::logging::{self, DataSource};
use homemon_service::{pipeline, verify};

/// Command-line arguments for homemon
#[derive(Parser, Debug)]
#[command(name = "homemon")]
#[command(about = "Collects room sensor, weather and broadband data")]
#[command(version)]
struct Cli {
    /// TOML configuration file (default: ./homemon.toml if present)
    #[arg(short, long, env = "HOMEMON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read each sensor once and store the readings
    Sensor {
        /// Helper scripts to run instead of the ones found in the scripts directory
        scripts: Vec<PathBuf>,
    },
    /// Fetch current, forecast, daily and weekly weather reports
    Weather {
        /// Forecast breadth in days
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=MAX_FORECAST_DAYS as i64))]
        days: Option<u8>,
    },
    /// Merge downloaded speed-test exports into the master CSV
    Broadband,
    /// Check sensors, weather API, database and export directory
    Verify {
        /// Print the report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    ) {
        eprintln!("Cannot initialise logging: {}", e);
        return ExitCode::from(2);
    }

    match cli.command {
        Command::Sensor { scripts } => {
            pipeline::run_sensors(&config, &scripts);
            ExitCode::SUCCESS
        }
        Command::Weather { days } => {
            match pipeline::run_weather(&config, days.unwrap_or(config.weather.days)) {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => {
                    logging::error(DataSource::Weather, None, &format!("Configuration error: {}", e));
                    ExitCode::from(2)
                }
            }
        }
        Command::Broadband => {
            pipeline::run_broadband(&config);
            ExitCode::SUCCESS
        }
        Command::Verify { json } => run_verify(&config, json),
    }
}

fn run_verify(config: &Config, json: bool) -> ExitCode {
    let report = match verify::run_full_verification(config) {
        Ok(report) => report,
        Err(e) => {
            logging::error(DataSource::System, None, &format!("Verification failed: {}", e));
            return ExitCode::FAILURE;
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                logging::error(DataSource::System, None, &format!("Cannot encode report: {}", e));
                return ExitCode::FAILURE;
            }
        }
    } else {
        verify::print_summary(&report);
    }

    if report.summary.sensors_failed + report.summary.services_failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
