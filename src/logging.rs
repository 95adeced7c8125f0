/// Structured logging for the home monitoring service
///
/// Every event carries the pipeline it came from and, where it applies, the
/// sensor location or place name. Events go to the console and optionally
/// to an append-only log file for cron/systemd runs.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use crate::model::{AcquireError, SinkError, WeatherError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Sensor,
    Weather,
    Broadband,
    Tsdb,
    Csv,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Sensor => write!(f, "SENSOR"),
            DataSource::Weather => write!(f, "WEATHER"),
            DataSource::Broadband => write!(f, "BROADBAND"),
            DataSource::Tsdb => write!(f, "TSDB"),
            DataSource::Csv => write!(f, "CSV"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - sensor out of range, busy, or the API has no data yet
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `min_level` when set. With
/// `console_timestamps` off, console lines are printed without a time prefix
/// (cron mail and journald add their own). The optional log file always gets
/// timestamps and no ANSI colours.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&Path>,
    console_timestamps: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.as_filter()));

    let timed = console_timestamps.then(|| tfmt::layer().with_target(false));
    let plain = (!console_timestamps).then(|| tfmt::layer().with_target(false).without_time());

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tfmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(timed)
        .with(plain)
        .with(file_layer)
        .try_init()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(source: DataSource, location: Option<&str>, message: &str) {
    tracing::info!(source = %source, location = location.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(source: DataSource, location: Option<&str>, message: &str) {
    tracing::warn!(source = %source, location = location.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(source: DataSource, location: Option<&str>, message: &str) {
    tracing::error!(source = %source, location = location.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(source: DataSource, location: Option<&str>, message: &str) {
    tracing::debug!(source = %source, location = location.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a sensor acquisition failure
pub fn classify_acquire_failure(err: &AcquireError) -> FailureType {
    match err {
        // Another process holds the sensor; the next scheduled run will get it.
        AcquireError::Busy => FailureType::Expected,
        // Out of radio range or flat battery, can't tell which from here.
        AcquireError::RetriesExhausted { .. } => FailureType::Unknown,
        AcquireError::Source(_) => FailureType::Unexpected,
    }
}

/// Classify an OpenWeatherMap failure
pub fn classify_weather_failure(err: &WeatherError) -> FailureType {
    match err {
        // 401 bad key, 429 rate limit, 5xx outage
        WeatherError::HttpError(_) => FailureType::Unexpected,
        WeatherError::RequestError(_) => FailureType::Unknown,
        // Parse errors suggest API changes or bugs
        WeatherError::ParseError(_) => FailureType::Unexpected,
    }
}

/// Classify a persistence failure
pub fn classify_sink_failure(err: &SinkError) -> FailureType {
    match err {
        SinkError::Unreachable(_) => FailureType::Unknown,
        SinkError::Io(_) | SinkError::Rejected(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

fn log_classified(
    source: DataSource,
    location: Option<&str>,
    operation: &str,
    failure_type: FailureType,
    err: &dyn std::error::Error,
) {
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(source, location, &message),
        FailureType::Unexpected => error(source, location, &message),
        FailureType::Unknown => warn(source, location, &message),
    }
}

/// Log a sensor acquisition failure with automatic classification
pub fn log_acquire_failure(location: &str, err: &AcquireError) {
    log_classified(
        DataSource::Sensor,
        Some(location),
        "Acquire reading",
        classify_acquire_failure(err),
        err,
    );
}

/// Log a weather fetch failure with automatic classification
pub fn log_weather_failure(operation: &str, err: &WeatherError) {
    log_classified(DataSource::Weather, None, operation, classify_weather_failure(err), err);
}

/// Log a sink failure with automatic classification
pub fn log_sink_failure(source: DataSource, location: Option<&str>, operation: &str, err: &SinkError) {
    log_classified(source, location, operation, classify_sink_failure(err), err);
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one pipeline run
pub fn log_run_summary(source: DataSource, total: usize, successful: usize, failed: usize) {
    let message = format!(
        "Run complete: {}/{} persisted, {} failed",
        successful,
        total,
        failed
    );

    if failed == 0 {
        info(source, None, &message);
    } else if successful == 0 {
        error(source, None, &message);
    } else {
        warn(source, None, &message);
    }
}
