/// Integration tests for the sensor pipeline with real helper processes
///
/// These tests verify:
/// 1. Helper scripts are discovered by file name pattern
/// 2. Valid readings reach the CSV file; busy and implausible ones do not
/// 3. The CSV header is written exactly once across runs
/// 4. Transient helper failures are retried until a reading arrives
///
/// Helpers are small `sh` scripts in a temporary directory; the time-series
/// database is disabled. Backoff is configured to zero seconds.
///
/// Run with: cargo test --test sensor_pipeline

use std::fs;
use std::path::{Path, PathBuf};

use homemon_service::config::Config;
use homemon_service::model::FieldLayout;
use homemon_service::pipeline::{SensorRunSummary, run_sensors};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn helper(dir: &Path, location: &str, body: &str) -> PathBuf {
    let path = dir.join(format!("read_Mi_Temp_Humid_{}.sh", location));
    fs::write(&path, body).unwrap();
    path
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.sensor.scripts_dir = dir.path().join("sensors");
    config.sensor.csv_path = dir.path().join("data").join("temperature.csv");
    config.sensor.base_delay_secs = 0;
    config.sensor.write_tsdb = false;
    fs::create_dir_all(&config.sensor.scripts_dir).unwrap();
    config
}

/// CSV data rows without their timestamp column.
fn rows_without_time(csv: &Path) -> Vec<String> {
    fs::read_to_string(csv)
        .unwrap()
        .lines()
        .skip(1)
        .map(|line| line.split_once(',').map(|(_, rest)| rest.to_string()).unwrap_or_default())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_discovered_helpers_write_valid_readings_to_csv() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let scripts = &config.sensor.scripts_dir;

    helper(scripts, "Kitchen", "echo 'Kitchen, 22.5, 45, 3.1'\n");
    // First line is out of range and skipped without a retry.
    helper(scripts, "Bath", "echo 'Bath, 75.0, 45, 3.1'\necho 'Bath, 21.0, 60, 3.0'\n");
    helper(scripts, "Attic", "echo 'busy'\n");
    fs::write(scripts.join("README.txt"), "not a helper").unwrap();

    let summary = run_sensors(&config, &[]);
    assert_eq!(
        summary,
        SensorRunSummary {
            sensors: 3,
            readings: 2,
            failed: 1,
            write_failures: 0,
        }
    );

    let csv = fs::read_to_string(&config.sensor.csv_path).unwrap();
    assert!(csv.starts_with("timestamp,location,temperature,humidity,battery\n"));
    // Helpers run in name order: Attic, Bath, Kitchen.
    assert_eq!(
        rows_without_time(&config.sensor.csv_path),
        vec!["Bath,21.0,60,3.0", "Kitchen,22.5,45,3.1"]
    );
}

#[test]
fn test_header_written_once_across_runs() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    helper(&config.sensor.scripts_dir, "Kitchen", "echo 'Kitchen, 22.5, 45, 3.1'\n");

    run_sensors(&config, &[]);
    run_sensors(&config, &[]);

    let csv = fs::read_to_string(&config.sensor.csv_path).unwrap();
    assert_eq!(csv.matches("timestamp,location").count(), 1);
    assert_eq!(csv.lines().count(), 3);
}

#[test]
fn test_explicit_script_list_overrides_discovery() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.sensor.layout = FieldLayout::Basic;
    helper(&config.sensor.scripts_dir, "Kitchen", "echo 'Kitchen, 22.5, 45'\n");
    let other = dir.path().join("garage.sh");
    fs::write(&other, "echo 'Garage, 8.5, 80'\n").unwrap();

    let summary = run_sensors(&config, &[other]);
    assert_eq!(summary.sensors, 1);
    assert_eq!(summary.readings, 1);
    assert_eq!(rows_without_time(&config.sensor.csv_path), vec!["Garage,8.5,80,"]);
}

#[test]
fn test_transient_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let counter = dir.path().join("attempts");
    let body = format!(
        "n=$(cat '{0}' 2>/dev/null || echo 0)\n\
         n=$((n + 1))\n\
         echo $n > '{0}'\n\
         if [ $n -le 2 ]; then echo 'reading failed'; else echo 'Garage, 12.0, 70, 2.9'; fi\n",
        counter.display()
    );
    helper(&config.sensor.scripts_dir, "Garage", &body);

    let summary = run_sensors(&config, &[]);
    assert_eq!(summary.readings, 1);
    assert_eq!(fs::read_to_string(&counter).unwrap().trim(), "3");
    assert_eq!(rows_without_time(&config.sensor.csv_path), vec!["Garage,12.0,70,2.9"]);
}

#[test]
fn test_helper_that_never_recovers_gives_up() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let counter = dir.path().join("attempts");
    let body = format!(
        "echo x >> '{0}'\necho 'error: connection failed'\n",
        counter.display()
    );
    helper(&config.sensor.scripts_dir, "Cellar", &body);

    let summary = run_sensors(&config, &[]);
    assert_eq!(summary.readings, 0);
    assert_eq!(summary.failed, 1);
    // First attempt plus three retries.
    assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 4);
    assert!(!config.sensor.csv_path.exists());
}
