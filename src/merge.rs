//! Broadband speed-test export merge.
//!
//! The speed-test website exports one semicolon-delimited CSV per run
//! (`Breitbandmessung_*.csv`, German number format, date and time in
//! separate columns). Each merge folds all pending exports into a single
//! comma-delimited master table keyed by Test-ID and then deletes the
//! exports it consumed.
//!
//! Master rows always precede new rows, so on a Test-ID collision the row
//! already in the master wins. Re-running a merge on a file that survived a
//! crash is harmless: every one of its Test-IDs is already present.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::config::BroadbandConfig;
use crate::csv::{format_float, parse_rows, write_row};
use crate::files::find_matching;
use crate::logging::{self, DataSource};
use crate::model::MeasurementRecord;

/// Column order of the master table.
pub const MASTER_HEADER: [&str; 8] = [
    "Messzeitpunkt",
    "Download (Mbit/s)",
    "Upload (Mbit/s)",
    "Laufzeit (ms)",
    "Test-ID",
    "Version",
    "Betriebssystem",
    "Internet-Browser",
];

const TEST_ID_COLUMN: usize = 4;

const EXPORT_SEPARATOR: char = ';';
const MASTER_SEPARATOR: char = ',';

const EXPORT_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
pub const MASTER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub enum MergeError {
    Io(String),
    MissingColumn { file: PathBuf, column: String },
    /// `line` is 1-based and counts the header.
    InvalidRow { file: PathBuf, line: usize, reason: String },
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::Io(msg) => write!(f, "I/O error: {}", msg),
            MergeError::MissingColumn { file, column } => {
                write!(f, "{}: missing column '{}'", file.display(), column)
            }
            MergeError::InvalidRow { file, line, reason } => {
                write!(f, "{}:{}: {}", file.display(), line, reason)
            }
        }
    }
}

impl std::error::Error for MergeError {}

impl From<std::io::Error> for MergeError {
    fn from(err: std::io::Error) -> Self {
        MergeError::Io(err.to_string())
    }
}

/// Outcome of one merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub files_read: usize,
    pub files_skipped: usize,
    /// Data rows in the master after the merge.
    pub rows_written: usize,
    pub duplicates_dropped: usize,
}

// ---------------------------------------------------------------------------
// Export files
// ---------------------------------------------------------------------------

fn column_index(header: &[String], column: &str, file: &Path) -> Result<usize, MergeError> {
    header
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| MergeError::MissingColumn {
            file: file.to_path_buf(),
            column: column.to_string(),
        })
}

/// `98,53` → 98.53
fn parse_decimal(value: &str) -> Option<f64> {
    value.trim().replace(',', ".").parse().ok()
}

/// Parse the text of one speed-test export. Columns are located by header
/// name, so reordered exports are accepted.
pub fn parse_export(text: &str, file: &Path) -> Result<Vec<MeasurementRecord>, MergeError> {
    let rows = parse_rows(text, EXPORT_SEPARATOR);
    let Some((header, data)) = rows.split_first() else {
        return Err(MergeError::InvalidRow {
            file: file.to_path_buf(),
            line: 1,
            reason: "empty file".to_string(),
        });
    };

    let col = |name: &str| column_index(header, name, file);
    let date = col("Messzeitpunkt")?;
    let time = col("Uhrzeit")?;
    let download = col("Download (Mbit/s)")?;
    let upload = col("Upload (Mbit/s)")?;
    let latency = col("Laufzeit (ms)")?;
    let test_id = col("Test-ID")?;
    let version = col("Version")?;
    let os = col("Betriebssystem")?;
    let browser = col("Internet-Browser")?;

    data.iter()
        .enumerate()
        .map(|(i, row)| {
            let invalid = |reason: String| MergeError::InvalidRow {
                file: file.to_path_buf(),
                line: i + 2,
                reason,
            };
            if row.len() != header.len() {
                return Err(invalid(format!(
                    "expected {} columns, found {}",
                    header.len(),
                    row.len()
                )));
            }

            let stamp = format!("{} {}", row[date].trim(), row[time].trim());
            let measured_at = NaiveDateTime::parse_from_str(&stamp, EXPORT_TIME_FORMAT)
                .map_err(|_| invalid(format!("invalid timestamp '{}'", stamp)))?;
            let download_mbit_s = parse_decimal(&row[download])
                .ok_or_else(|| invalid(format!("invalid download '{}'", row[download])))?;
            let upload_mbit_s = parse_decimal(&row[upload])
                .ok_or_else(|| invalid(format!("invalid upload '{}'", row[upload])))?;
            let latency_ms = row[latency]
                .trim()
                .parse()
                .map_err(|_| invalid(format!("invalid latency '{}'", row[latency])))?;

            let id = row[test_id].trim();
            if id.is_empty() {
                return Err(invalid("empty Test-ID".to_string()));
            }

            Ok(MeasurementRecord {
                measured_at,
                download_mbit_s,
                upload_mbit_s,
                latency_ms,
                test_id: id.to_string(),
                version: row[version].trim().to_string(),
                os: row[os].trim().to_string(),
                browser: row[browser].trim().to_string(),
            })
        })
        .collect()
}

pub fn read_export(path: &Path) -> Result<Vec<MeasurementRecord>, MergeError> {
    let text = fs::read_to_string(path)?;
    parse_export(&text, path)
}

/// Master-table cells for one record, in `MASTER_HEADER` order.
pub fn record_row(record: &MeasurementRecord) -> [String; 8] {
    [
        record.measured_at.format(MASTER_TIME_FORMAT).to_string(),
        format_float(record.download_mbit_s),
        format_float(record.upload_mbit_s),
        record.latency_ms.to_string(),
        record.test_id.clone(),
        record.version.clone(),
        record.os.clone(),
        record.browser.clone(),
    ]
}

// ---------------------------------------------------------------------------
// Master table
// ---------------------------------------------------------------------------

/// Create the master with only its header row if it does not exist yet.
pub fn ensure_master(path: &Path) -> Result<(), MergeError> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let empty: Vec<[String; 8]> = Vec::new();
    write_master(path, &empty)?;
    logging::info(
        DataSource::Broadband,
        None,
        &format!("Created master table {}", path.display()),
    );
    Ok(())
}

/// Data rows of the master, reordered into `MASTER_HEADER` column order.
///
/// Rows are kept as text so untouched rows are written back byte for byte.
pub fn read_master(path: &Path) -> Result<Vec<Vec<String>>, MergeError> {
    let text = fs::read_to_string(path)?;
    let rows = parse_rows(&text, MASTER_SEPARATOR);
    let Some((header, data)) = rows.split_first() else {
        return Ok(Vec::new());
    };

    let order = MASTER_HEADER
        .iter()
        .map(|name| column_index(header, name, path))
        .collect::<Result<Vec<_>, _>>()?;

    data.iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() != header.len() {
                return Err(MergeError::InvalidRow {
                    file: path.to_path_buf(),
                    line: i + 2,
                    reason: format!("expected {} columns, found {}", header.len(), row.len()),
                });
            }
            Ok(order.iter().map(|&idx| row[idx].clone()).collect())
        })
        .collect()
}

/// Overwrite the master via a sibling temp file and a rename.
fn write_master<R: AsRef<[String]>>(path: &Path, rows: &[R]) -> Result<(), MergeError> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        write_row(&mut out, &MASTER_HEADER, MASTER_SEPARATOR)?;
        for row in rows {
            write_row(&mut out, row.as_ref(), MASTER_SEPARATOR)?;
        }
        out.flush()?;
        out.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Fold every pending export into the master, then delete the exports.
///
/// With no pending exports the master is left untouched. An export that
/// fails to parse is skipped and kept on disk; the others still merge.
pub fn merge_exports(config: &BroadbandConfig) -> Result<MergeSummary, MergeError> {
    fs::create_dir_all(&config.export_dir)?;
    ensure_master(&config.master_file)?;

    let pending = find_matching(&config.export_dir, &config.file_pattern)?;
    if pending.is_empty() {
        logging::info(DataSource::Broadband, None, "No pending export files");
        return Ok(MergeSummary::default());
    }

    let mut summary = MergeSummary::default();
    let mut seen = HashSet::new();
    let mut merged: Vec<Vec<String>> = Vec::new();

    for row in read_master(&config.master_file)? {
        if seen.insert(row[TEST_ID_COLUMN].clone()) {
            merged.push(row);
        } else {
            summary.duplicates_dropped += 1;
        }
    }

    let mut consumed = Vec::new();
    for path in &pending {
        match read_export(path) {
            Ok(records) => {
                for record in &records {
                    if seen.insert(record.test_id.clone()) {
                        merged.push(record_row(record).to_vec());
                    } else {
                        summary.duplicates_dropped += 1;
                    }
                }
                summary.files_read += 1;
                consumed.push(path);
            }
            Err(e) => {
                summary.files_skipped += 1;
                logging::warn(
                    DataSource::Broadband,
                    None,
                    &format!("Skipping export, left in place: {}", e),
                );
            }
        }
    }

    if consumed.is_empty() {
        return Ok(summary);
    }

    write_master(&config.master_file, &merged)?;
    summary.rows_written = merged.len();
    logging::info(
        DataSource::Broadband,
        None,
        &format!(
            "Read {} files, wrote {} rows to {} ({} duplicates dropped)",
            summary.files_read,
            summary.rows_written,
            config.master_file.display(),
            summary.duplicates_dropped
        ),
    );

    // Not transactional: a leftover export is absorbed by the next run's dedup.
    for path in consumed {
        if let Err(e) = fs::remove_file(path) {
            logging::warn(
                DataSource::Broadband,
                None,
                &format!("Could not delete {}: {}", path.display(), e),
            );
        }
    }

    Ok(summary)
}
