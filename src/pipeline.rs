//! One-shot pipeline runs behind the CLI subcommands.
//!
//! Each run absorbs its own failures: acquisition, fetch and write errors
//! are logged and counted, never propagated. Only configuration problems
//! surface as errors, since nothing useful can happen without them.

use std::path::PathBuf;

use crate::config::{Config, ConfigError, SensorConfig, TsdbConfig, validate_days};
use crate::files::find_matching;
use crate::ingest::openweather::{WEEK_DAYS, WeatherClient, weekly_summary};
use crate::logging::{self, DataSource};
use crate::merge::{MergeSummary, merge_exports};
use crate::model::{SensorReading, WeatherError, WeatherReport};
use crate::sensor::retry::{RetryController, Sleeper, ThreadSleeper};
use crate::sensor::source::ScriptSource;
use crate::sink::ReadingSink;
use crate::sink::csv::CsvSink;
use crate::sink::tsdb::TimeSeriesSink;

// ============================================================================
// Shared
// ============================================================================

/// Open the configured time-series backend for one write batch.
///
/// `None` when the backend is disabled or fails its health check; in the
/// latter case the batch is skipped with a logged message.
pub fn open_tsdb(config: &TsdbConfig) -> Option<TimeSeriesSink> {
    match TimeSeriesSink::open(config) {
        Ok(Some(sink)) => Some(sink),
        Ok(None) => {
            logging::debug(DataSource::Tsdb, None, "Time-series backend disabled");
            None
        }
        Err(e) => {
            logging::log_sink_failure(DataSource::Tsdb, None, "Health check", &e);
            logging::warn(DataSource::Tsdb, None, "Database not reachable, skipping writes");
            None
        }
    }
}

fn sink_source(sink: &dyn ReadingSink) -> DataSource {
    match sink.name() {
        "csv" => DataSource::Csv,
        _ => DataSource::Tsdb,
    }
}

// ============================================================================
// Sensor Pipeline
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorRunSummary {
    pub sensors: usize,
    pub readings: usize,
    pub failed: usize,
    /// Individual sink writes that failed.
    pub write_failures: usize,
}

/// Hand one reading to every sink. Returns the number of successful writes.
pub fn persist_reading(reading: &SensorReading, sinks: &mut [Box<dyn ReadingSink>]) -> usize {
    let mut written = 0;
    for sink in sinks.iter_mut() {
        match sink.write_reading(reading) {
            Ok(()) => {
                written += 1;
                logging::debug(
                    sink_source(&**sink),
                    Some(&reading.location),
                    "Reading written",
                );
            }
            Err(e) => logging::log_sink_failure(
                sink_source(&**sink),
                Some(&reading.location),
                "Write reading",
                &e,
            ),
        }
    }
    written
}

/// Helper scripts in the configured directory, sorted by name.
pub fn discover_scripts(config: &SensorConfig) -> std::io::Result<Vec<PathBuf>> {
    find_matching(&config.scripts_dir, &config.script_pattern)
}

/// The sinks a sensor run writes to, per configuration.
pub fn open_sensor_sinks(config: &Config) -> Vec<Box<dyn ReadingSink>> {
    let mut sinks: Vec<Box<dyn ReadingSink>> = Vec::new();
    if config.sensor.write_csv {
        sinks.push(Box::new(CsvSink::new(&config.sensor.csv_path)));
    }
    if config.sensor.write_tsdb {
        if let Some(tsdb) = open_tsdb(&config.tsdb) {
            sinks.push(Box::new(tsdb));
        }
    }
    sinks
}

/// Read every sensor once and persist the valid readings.
///
/// With no `scripts` given, the helpers are discovered in the configured
/// scripts directory.
pub fn run_sensors(config: &Config, scripts: &[PathBuf]) -> SensorRunSummary {
    let scripts = if scripts.is_empty() {
        match discover_scripts(&config.sensor) {
            Ok(found) => found,
            Err(e) => {
                logging::error(
                    DataSource::Sensor,
                    None,
                    &format!(
                        "Cannot list helper scripts in {}: {}",
                        config.sensor.scripts_dir.display(),
                        e
                    ),
                );
                return SensorRunSummary::default();
            }
        }
    } else {
        scripts.to_vec()
    };

    if scripts.is_empty() {
        logging::warn(DataSource::Sensor, None, "No sensor helper scripts found");
        return SensorRunSummary::default();
    }

    let mut sinks = open_sensor_sinks(config);
    if sinks.is_empty() {
        logging::warn(DataSource::Sensor, None, "No sink available, readings will be dropped");
    }

    let controller = RetryController::new(
        config.sensor.retry_policy(),
        config.sensor.layout,
        ThreadSleeper,
    );
    collect_readings(&config.sensor, &scripts, controller, &mut sinks)
}

/// Acquire one reading per script with `controller` and write it to `sinks`.
pub fn collect_readings<S: Sleeper>(
    config: &SensorConfig,
    scripts: &[PathBuf],
    mut controller: RetryController<S>,
    sinks: &mut [Box<dyn ReadingSink>],
) -> SensorRunSummary {
    let mut summary = SensorRunSummary {
        sensors: scripts.len(),
        ..SensorRunSummary::default()
    };

    for script in scripts {
        let mut source = ScriptSource::new(&config.shell, script);
        match controller.acquire(&mut source) {
            Ok(reading) => {
                logging::info(
                    DataSource::Sensor,
                    Some(&reading.location),
                    &format!(
                        "{:.1}°C, {}%{}",
                        reading.temperature_c,
                        reading.humidity_pct,
                        reading
                            .battery_v
                            .map(|b| format!(", {:.2}V", b))
                            .unwrap_or_default()
                    ),
                );
                summary.readings += 1;
                let written = persist_reading(&reading, sinks);
                summary.write_failures += sinks.len() - written;
            }
            Err(e) => {
                logging::log_acquire_failure(&crate::sensor::source::sensor_name(script), &e);
                summary.failed += 1;
            }
        }
    }

    logging::log_run_summary(DataSource::Sensor, summary.sensors, summary.readings, summary.failed);
    summary
}

// ============================================================================
// Weather Pipeline
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeatherRunSummary {
    pub requests: usize,
    pub failed_requests: usize,
    pub reports: usize,
    pub invalid: usize,
    pub persisted: usize,
}

/// Fetch all report kinds for `days` days.
///
/// A failed request is logged and counted; the other kinds are still
/// fetched. The weekly summary is only built when at least seven days are
/// requested.
pub fn fetch_reports(client: &WeatherClient, days: u8, summary: &mut WeatherRunSummary) -> Vec<WeatherReport> {
    let mut reports = Vec::new();
    let mut record = |operation: &str, result: Result<Vec<WeatherReport>, WeatherError>| {
        summary.requests += 1;
        match result {
            Ok(fetched) => Some(fetched),
            Err(e) => {
                logging::log_weather_failure(operation, &e);
                summary.failed_requests += 1;
                None
            }
        }
    };

    if let Some(current) = record("Fetch current weather", client.fetch_current().map(|r| vec![r])) {
        reports.extend(current);
    }
    if let Some(forecast) = record("Fetch forecast", client.fetch_forecast(days)) {
        reports.extend(forecast);
    }
    if let Some(daily) = record("Fetch daily forecast", client.fetch_daily(days)) {
        if usize::from(days) >= WEEK_DAYS {
            reports.extend(weekly_summary(&daily));
        }
        reports.extend(daily);
    }

    summary.reports = reports.len();
    reports
}

/// Drop reports without a location; warn about reports without a
/// temperature but keep them.
pub fn valid_reports(reports: Vec<WeatherReport>, summary: &mut WeatherRunSummary) -> Vec<WeatherReport> {
    reports
        .into_iter()
        .filter(|report| {
            if !report.is_valid() {
                logging::warn(
                    DataSource::Weather,
                    None,
                    &format!("Invalid {} report (no location), discarding", report.kind),
                );
                summary.invalid += 1;
                return false;
            }
            if !report.has_temperature() {
                logging::warn(
                    DataSource::Weather,
                    report.location.as_deref(),
                    &format!("{} report at {} has no temperature", report.kind, report.timestamp),
                );
            }
            true
        })
        .collect()
}

/// Write `reports` one point each. Returns the number written.
pub fn persist_reports(reports: &[WeatherReport], sink: &mut TimeSeriesSink) -> usize {
    let mut written = 0;
    for report in reports {
        match sink.write_report(report) {
            Ok(()) => written += 1,
            Err(e) => logging::log_sink_failure(
                DataSource::Tsdb,
                report.location.as_deref(),
                &format!("Write {} report", report.kind),
                &e,
            ),
        }
    }
    written
}

/// Poll OpenWeatherMap for `days` days and write the valid reports.
///
/// Fails only on configuration errors: a day count outside 1–16 or missing
/// credentials.
pub fn run_weather(config: &Config, days: u8) -> Result<WeatherRunSummary, ConfigError> {
    let days = validate_days(days)?;
    let credentials = config.weather.credentials()?;
    let mut summary = WeatherRunSummary::default();

    let client = match WeatherClient::new(&config.weather, credentials) {
        Ok(client) => client,
        Err(e) => {
            logging::log_weather_failure("Create HTTP client", &e);
            return Ok(summary);
        }
    };

    logging::info(
        DataSource::Weather,
        None,
        &format!("Getting data from openweathermap for {} days", days),
    );
    let reports = fetch_reports(&client, days, &mut summary);
    let reports = valid_reports(reports, &mut summary);

    // Only touch the database when there is something to write.
    if !reports.is_empty() {
        if let Some(mut sink) = open_tsdb(&config.tsdb) {
            summary.persisted = persist_reports(&reports, &mut sink);
        }
    }

    logging::log_run_summary(
        DataSource::Weather,
        summary.reports + summary.failed_requests,
        summary.persisted,
        summary.failed_requests + summary.invalid + (reports.len() - summary.persisted),
    );
    Ok(summary)
}

// ============================================================================
// Broadband Pipeline
// ============================================================================

/// Merge pending speed-test exports. Errors are logged and absorbed.
pub fn run_broadband(config: &Config) -> Option<MergeSummary> {
    match merge_exports(&config.broadband) {
        Ok(summary) => Some(summary),
        Err(e) => {
            logging::error(DataSource::Broadband, None, &format!("Merge failed: {}", e));
            None
        }
    }
}
