/// Integration tests for the broadband export merge
///
/// These tests verify:
/// 1. First run creates the master table from pending exports
/// 2. Later runs append only unseen Test-IDs and delete consumed exports
/// 3. A run without exports leaves the master byte-for-byte unchanged
///
/// Run with: cargo test --test broadband_merge

use std::fs;
use std::path::Path;

use homemon_service::config::Config;
use homemon_service::merge::{MASTER_HEADER, read_master};
use homemon_service::pipeline::run_broadband;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const EXPORT_HEADER: &str = "\u{feff}Messzeitpunkt;Uhrzeit;Download (Mbit/s);Upload (Mbit/s);Laufzeit (ms);Test-ID;Version;Betriebssystem;Internet-Browser\r\n";

fn write_export(dir: &Path, name: &str, rows: &[&str]) {
    let mut text = EXPORT_HEADER.to_string();
    for row in rows {
        text.push_str(row);
        text.push_str("\r\n");
    }
    fs::write(dir.join(name), text).unwrap();
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.broadband.export_dir = dir.path().join("export");
    config.broadband.master_file = dir.path().join("export").join("data.csv");
    config
}

fn pending(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("Breitbandmessung_"))
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_merge_runs_accumulate_unique_tests() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let export = &config.broadband.export_dir;
    fs::create_dir_all(export).unwrap();

    write_export(
        export,
        "Breitbandmessung_05_01_2024_18_30_12.csv",
        &["\"05.01.2024\";\"18:30:12\";\"98,53\";\"38,20\";\"23\";\"t-1\";\"3.3.1\";\"Linux\";\"Firefox 121.0\""],
    );
    write_export(
        export,
        "Breitbandmessung_06_01_2024_07_00_00.csv",
        &["06.01.2024;07:00:00;101,2;40,0;19;t-2;3.3.1;Linux;Firefox 121.0"],
    );

    let first = run_broadband(&config).expect("merge succeeds");
    assert_eq!(first.files_read, 2);
    assert_eq!(first.rows_written, 2);
    assert!(pending(export).is_empty());

    write_export(
        export,
        "Breitbandmessung_07_01_2024_07_00_00.csv",
        &[
            "06.01.2024;07:00:00;101,2;40,0;19;t-2;3.3.1;Linux;Firefox 121.0",
            "07.01.2024;07:00:00;95,0;39,5;21;t-3;3.3.1;Linux;Firefox 121.0",
        ],
    );
    let second = run_broadband(&config).expect("merge succeeds");
    assert_eq!(second.files_read, 1);
    assert_eq!(second.duplicates_dropped, 1);
    assert_eq!(second.rows_written, 3);

    let master = fs::read_to_string(&config.broadband.master_file).unwrap();
    let lines: Vec<&str> = master.lines().collect();
    assert_eq!(lines[0], MASTER_HEADER.join(","));
    assert_eq!(lines[1], "2024-01-05 18:30:12,98.53,38.2,23,t-1,3.3.1,Linux,Firefox 121.0");
    assert_eq!(lines[2], "2024-01-06 07:00:00,101.2,40.0,19,t-2,3.3.1,Linux,Firefox 121.0");
    assert_eq!(lines[3], "2024-01-07 07:00:00,95.0,39.5,21,t-3,3.3.1,Linux,Firefox 121.0");
}

#[test]
fn test_run_without_exports_keeps_master_bytes() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let export = &config.broadband.export_dir;
    fs::create_dir_all(export).unwrap();
    write_export(
        export,
        "Breitbandmessung_1.csv",
        &["05.01.2024;18:30:12;98,53;38,2;23;t-1;3.3.1;Linux;Firefox"],
    );
    run_broadband(&config).expect("merge succeeds");
    let before = fs::read(&config.broadband.master_file).unwrap();

    let summary = run_broadband(&config).expect("merge succeeds");
    assert_eq!(summary.files_read, 0);
    assert_eq!(fs::read(&config.broadband.master_file).unwrap(), before);
    assert_eq!(read_master(&config.broadband.master_file).unwrap().len(), 1);
}

#[test]
fn test_missing_export_dir_is_created() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let summary = run_broadband(&config).expect("merge succeeds");
    assert_eq!(summary.files_read, 0);
    assert!(config.broadband.export_dir.is_dir());
    assert!(config.broadband.master_file.is_file());
}
