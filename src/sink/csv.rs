//! Append-only CSV file of sensor readings.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::csv::{format_float, write_row};
use crate::model::{SensorReading, SinkError};
use crate::sink::ReadingSink;

pub const SENSOR_CSV_HEADER: [&str; 5] = ["timestamp", "location", "temperature", "humidity", "battery"];

/// RFC 3339 in UTC, second precision.
pub const SENSOR_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Column values for one reading, in header order. A missing battery is an
/// empty field.
pub fn reading_row(reading: &SensorReading) -> [String; 5] {
    [
        reading.timestamp.format(SENSOR_TIME_FORMAT).to_string(),
        reading.location.clone(),
        format_float(reading.temperature_c),
        reading.humidity_pct.to_string(),
        reading.battery_v.map(format_float).unwrap_or_default(),
    ]
}

impl ReadingSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn write_reading(&mut self, reading: &SensorReading) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // `create_new` makes exactly one run see the file as new and write the header.
        let mut file = match OpenOptions::new().append(true).create_new(true).open(&self.path) {
            Ok(mut file) => {
                write_row(&mut file, &SENSOR_CSV_HEADER, ',')?;
                file
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                OpenOptions::new().append(true).open(&self.path)?
            }
            Err(e) => return Err(e.into()),
        };

        write_row(&mut file, &reading_row(reading), ',')?;
        file.flush()?;
        Ok(())
    }
}
