//! Interpretation of sensor helper output.
//!
//! A helper prints one of:
//! - a data line `location, temperature, humidity[, battery]`
//! - a transient failure (`reading failed`, `error ...`)
//! - `busy` when another process holds the sensor
//!
//! Substring matching happens here and nowhere else; callers work with
//! [`SourceLine`].

use chrono::{DateTime, Utc};

use crate::model::{FieldLayout, ParseError, SensorReading};

const FIELD_SEPARATOR: &str = ", ";

/// What a single line of helper output means to the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceLine {
    TransientFailure,
    Busy,
    Reading(SensorReading),
    Malformed(ParseError),
}

/// Classifies `line`, parsing it as a reading if it is not a status message.
///
/// Failure markers are checked before `busy`, so `error: device busy` counts
/// as a transient failure.
pub fn interpret_line(line: &str, layout: FieldLayout, now: DateTime<Utc>) -> SourceLine {
    if line.contains("reading failed") || line.contains("error") {
        return SourceLine::TransientFailure;
    }
    if line.contains("busy") {
        return SourceLine::Busy;
    }
    match parse_reading(line, layout, now) {
        Ok(reading) => SourceLine::Reading(reading),
        Err(err) => SourceLine::Malformed(err),
    }
}

/// Parses one data line into a reading timestamped `now`.
///
/// The field count must match `layout` exactly. Bounds are not checked here;
/// see `sensor::validate`.
pub fn parse_reading(
    line: &str,
    layout: FieldLayout,
    now: DateTime<Utc>,
) -> Result<SensorReading, ParseError> {
    let fields: Vec<&str> = line.trim_end().split(FIELD_SEPARATOR).collect();
    let expected = layout.field_count();
    if fields.len() != expected {
        return Err(ParseError::FieldCount {
            expected,
            found: fields.len(),
        });
    }

    let temperature_c = parse_number::<f64>("temperature", fields[1])?;
    let humidity_pct = parse_number::<i32>("humidity", fields[2])?;
    let battery_v = match layout {
        FieldLayout::Basic => None,
        FieldLayout::WithBattery => Some(parse_number::<f64>("battery", fields[3])?),
    };

    Ok(SensorReading {
        timestamp: now,
        location: fields[0].trim().to_string(),
        temperature_c,
        humidity_pct,
        battery_v,
    })
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ParseError> {
    raw.trim().parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}
