//! Pre-flight Verification Module
//!
//! Checks every external collaborator the pipelines depend on (sensor
//! helper scripts, the OpenWeatherMap API, the time-series database and the
//! broadband export directory) and reports which of them are usable.
//!
//! Use this after installing or changing the configuration, before handing
//! the pipelines to cron.

use std::error::Error;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::{BroadbandConfig, Config, TsdbBackend, TsdbConfig, WeatherConfig};
use crate::files::find_matching;
use crate::ingest::openweather::WeatherClient;
use crate::merge::read_master;
use crate::model::FieldLayout;
use crate::sensor::parse::{SourceLine, interpret_line};
use crate::sensor::source::{LineSource, ScriptSource};
use crate::sensor::validate::validate;
use crate::sink::tsdb::TimeSeriesSink;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub sensor_results: Vec<SensorVerification>,
    pub weather: WeatherVerification,
    pub tsdb: TsdbVerification,
    pub broadband: BroadbandVerification,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub sensors_total: usize,
    pub sensors_working: usize,
    pub sensors_failed: usize,
    pub services_total: usize,
    pub services_working: usize,
    pub services_failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorVerification {
    pub script: String,
    pub name: String,
    pub status: VerificationStatus,
    pub lines_seen: usize,
    pub sample_reading: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherVerification {
    pub status: VerificationStatus,
    pub credentials_present: bool,
    pub api_responsive: bool,
    pub location: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsdbVerification {
    pub backend: String,
    pub status: VerificationStatus,
    pub reachable: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadbandVerification {
    pub status: VerificationStatus,
    pub export_dir_exists: bool,
    pub pending_files: usize,
    pub master_rows: Option<usize>,
    pub browser_found: Option<bool>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
    /// Turned off in the configuration.
    Skipped,
}

impl VerificationStatus {
    fn is_working(&self) -> bool {
        matches!(self, VerificationStatus::Success | VerificationStatus::PartialSuccess)
    }
}

// ============================================================================
// Sensor Verification
// ============================================================================

/// Run a helper once, without retries, and look at what it prints.
///
/// A valid reading is a success. Output without one (busy sensor, transient
/// failure, implausible values) is a partial success: the helper works but
/// the sensor did not answer this time.
pub fn verify_sensor_script(shell: &str, script: &Path, layout: FieldLayout) -> SensorVerification {
    let mut source = ScriptSource::new(shell, script);
    let mut result = SensorVerification {
        script: script.display().to_string(),
        name: source.name().to_string(),
        status: VerificationStatus::Failed,
        lines_seen: 0,
        sample_reading: None,
        error_message: None,
    };

    let lines = match source.start() {
        Ok(lines) => lines,
        Err(e) => {
            result.error_message = Some(e.to_string());
            return result;
        }
    };

    for line in lines {
        result.lines_seen += 1;
        match interpret_line(&line, layout, Utc::now()) {
            SourceLine::Reading(reading) => match validate(&reading) {
                Ok(()) => {
                    result.sample_reading = Some(line);
                    result.status = VerificationStatus::Success;
                    return result;
                }
                Err(e) => result.error_message = Some(e.to_string()),
            },
            SourceLine::Malformed(e) => result.error_message = Some(e.to_string()),
            SourceLine::Busy => {
                result.error_message = Some("Sensor busy".to_string());
                break;
            }
            SourceLine::TransientFailure => {
                result.error_message = Some(format!("Helper reported: {}", line.trim()));
                break;
            }
        }
    }

    if result.lines_seen > 0 {
        result.status = VerificationStatus::PartialSuccess;
    } else {
        result.error_message = Some("Helper produced no output".to_string());
    }
    result
}

// ============================================================================
// Weather API Verification
// ============================================================================

pub fn verify_weather_api(config: &WeatherConfig) -> WeatherVerification {
    let mut result = WeatherVerification {
        status: VerificationStatus::Failed,
        credentials_present: false,
        api_responsive: false,
        location: None,
        error_message: None,
    };

    let credentials = match config.credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            result.error_message = Some(e.to_string());
            return result;
        }
    };
    result.credentials_present = true;

    match WeatherClient::new(config, credentials).and_then(|client| client.fetch_current()) {
        Ok(report) => {
            result.api_responsive = true;
            result.status = if report.is_valid() && report.has_temperature() {
                VerificationStatus::Success
            } else {
                VerificationStatus::PartialSuccess
            };
            result.location = report.location;
        }
        Err(e) => {
            result.error_message = Some(format!("API request failed: {}", e));
        }
    }

    result
}

// ============================================================================
// Time-series Database Verification
// ============================================================================

pub fn verify_tsdb(config: &TsdbConfig) -> TsdbVerification {
    let backend = match config.backend {
        TsdbBackend::Influx => format!("influx {}:{}", config.influx.host, config.influx.port),
        TsdbBackend::Postgres => "postgres".to_string(),
        TsdbBackend::Disabled => "disabled".to_string(),
    };
    let mut result = TsdbVerification {
        backend,
        status: VerificationStatus::Failed,
        reachable: false,
        error_message: None,
    };

    match TimeSeriesSink::open(config) {
        Ok(Some(_)) => {
            result.reachable = true;
            result.status = VerificationStatus::Success;
        }
        Ok(None) => result.status = VerificationStatus::Skipped,
        Err(e) => result.error_message = Some(e.to_string()),
    }

    result
}

// ============================================================================
// Broadband Export Verification
// ============================================================================

pub fn verify_broadband(config: &BroadbandConfig) -> BroadbandVerification {
    let mut result = BroadbandVerification {
        status: VerificationStatus::Failed,
        export_dir_exists: config.export_dir.is_dir(),
        pending_files: 0,
        master_rows: None,
        browser_found: config.browser_executable.as_ref().map(|p| p.is_file()),
        error_message: None,
    };

    if !result.export_dir_exists {
        // The merge creates it on first run.
        result.status = VerificationStatus::PartialSuccess;
        result.error_message = Some(format!("{} does not exist yet", config.export_dir.display()));
        return result;
    }

    match find_matching(&config.export_dir, &config.file_pattern) {
        Ok(files) => result.pending_files = files.len(),
        Err(e) => {
            result.error_message = Some(format!("Cannot list exports: {}", e));
            return result;
        }
    }

    if config.master_file.exists() {
        match read_master(&config.master_file) {
            Ok(rows) => result.master_rows = Some(rows.len()),
            Err(e) => {
                result.error_message = Some(format!("Master table unreadable: {}", e));
                return result;
            }
        }
    }

    result.status = match result.browser_found {
        Some(false) => {
            result.error_message = Some("Browser executable not found".to_string());
            VerificationStatus::PartialSuccess
        }
        _ => VerificationStatus::Success,
    };
    result
}

// ============================================================================
// Full Verification Runner
// ============================================================================

fn status_line(status: &VerificationStatus, ok: &str, error: Option<&str>) -> String {
    match status {
        VerificationStatus::Success => format!("✓ OK ({})", ok),
        VerificationStatus::PartialSuccess => {
            format!("⚠ Partial: {}", error.unwrap_or("no data"))
        }
        VerificationStatus::Failed => format!("✗ FAILED: {}", error.unwrap_or("Unknown")),
        VerificationStatus::Skipped => "- skipped".to_string(),
    }
}

/// Run every check. Progress goes to stderr so stdout stays free for the
/// report itself.
pub fn run_full_verification(config: &Config) -> Result<VerificationReport, Box<dyn Error>> {
    let mut summary = VerificationSummary::default();

    eprintln!("🔍 Verifying sensor helpers...");
    let scripts = find_matching(&config.sensor.scripts_dir, &config.sensor.script_pattern)
        .unwrap_or_else(|e| {
            eprintln!(
                "  ⚠ Cannot list {}: {}",
                config.sensor.scripts_dir.display(),
                e
            );
            Vec::new()
        });
    summary.sensors_total = scripts.len();

    let mut sensor_results = Vec::new();
    for script in &scripts {
        let result = verify_sensor_script(&config.sensor.shell, script, config.sensor.layout);
        eprintln!(
            "  {} ... {}",
            result.name,
            status_line(
                &result.status,
                result.sample_reading.as_deref().unwrap_or_default(),
                result.error_message.as_deref()
            )
        );
        if result.status.is_working() {
            summary.sensors_working += 1;
        } else {
            summary.sensors_failed += 1;
        }
        sensor_results.push(result);
    }

    eprintln!("\n🔍 Verifying weather API...");
    let weather = verify_weather_api(&config.weather);
    eprintln!(
        "  openweathermap ... {}",
        status_line(
            &weather.status,
            weather.location.as_deref().unwrap_or_default(),
            weather.error_message.as_deref()
        )
    );

    eprintln!("\n🔍 Verifying time-series database...");
    let tsdb = verify_tsdb(&config.tsdb);
    eprintln!(
        "  {} ... {}",
        tsdb.backend,
        status_line(&tsdb.status, "reachable", tsdb.error_message.as_deref())
    );

    eprintln!("\n🔍 Verifying broadband exports...");
    let broadband = verify_broadband(&config.broadband);
    let broadband_ok = format!(
        "{} pending, {} rows in master",
        broadband.pending_files,
        broadband.master_rows.unwrap_or(0)
    );
    eprintln!(
        "  {} ... {}",
        config.broadband.export_dir.display(),
        status_line(&broadband.status, &broadband_ok, broadband.error_message.as_deref())
    );

    for status in [&weather.status, &tsdb.status, &broadband.status] {
        if *status == VerificationStatus::Skipped {
            continue;
        }
        summary.services_total += 1;
        if status.is_working() {
            summary.services_working += 1;
        } else {
            summary.services_failed += 1;
        }
    }

    Ok(VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        sensor_results,
        weather,
        tsdb,
        broadband,
        summary,
    })
}

pub fn print_summary(report: &VerificationReport) {
    let rule = "═".repeat(60);
    println!("\n{}", rule);
    println!("📊 VERIFICATION SUMMARY");
    println!("{}", rule);
    println!();
    println!("Sensors:   {}/{} working  ({} failed)",
        report.summary.sensors_working, report.summary.sensors_total, report.summary.sensors_failed);
    println!("Services:  {}/{} working  ({} failed)",
        report.summary.services_working, report.summary.services_total, report.summary.services_failed);
    println!();

    let total_working = report.summary.sensors_working + report.summary.services_working;
    let total_checks = report.summary.sensors_total + report.summary.services_total;
    let success_rate = if total_checks > 0 {
        (total_working as f64 / total_checks as f64) * 100.0
    } else {
        0.0
    };

    println!("Overall Success Rate: {:.1}% ({}/{})", success_rate, total_working, total_checks);
    println!("{}", rule);
}
