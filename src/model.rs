/// Core data types for the home monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// sensor readings, weather reports, broadband measurements, time-series
/// points and the error types that flow between the pipeline stages.
/// It contains no logic and no I/O, only types.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sensor readings
// ---------------------------------------------------------------------------

/// One temperature/humidity reading from a Bluetooth sensor.
///
/// Produced by `sensor::parse::parse_reading` from a single line of helper
/// script output. Readings are never mutated after parsing; a reading that
/// fails `sensor::validate::validate` is dropped before it reaches a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub temperature_c: f64,
    pub humidity_pct: i32,
    pub battery_v: Option<f64>, // only reported by the newer helper scripts
}

/// Shape of a data line emitted by a sensor helper script.
///
/// The older helpers print `location, temperature, humidity`; the newer ones
/// append the battery voltage as a fourth field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldLayout {
    Basic,
    #[default]
    WithBattery,
}

impl FieldLayout {
    pub fn field_count(self) -> usize {
        match self {
            FieldLayout::Basic => 3,
            FieldLayout::WithBattery => 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Weather reports
// ---------------------------------------------------------------------------

/// Which OpenWeatherMap product a report was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Current,
    Forecast,
    Daily,
    Weekly,
}

impl ReportKind {
    /// Time-series measurement the report is stored under.
    pub fn measurement_name(self) -> &'static str {
        match self {
            ReportKind::Current => "current_weather",
            ReportKind::Forecast => "forecast_weather",
            ReportKind::Daily => "daily_weather",
            ReportKind::Weekly => "weekly_weather",
        }
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportKind::Current => write!(f, "current"),
            ReportKind::Forecast => write!(f, "forecast"),
            ReportKind::Daily => write!(f, "daily"),
            ReportKind::Weekly => write!(f, "weekly"),
        }
    }
}

/// WGS84 coordinates as reported by the weather API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// A single named metric value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// One weather report, filled field by field from an API response.
///
/// `location` stays `None` until the response names a place; reports without
/// a location are rejected by `WeatherReport::is_valid`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub timestamp: DateTime<Utc>,
    pub kind: ReportKind,
    pub location: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl WeatherReport {
    pub fn new(kind: ReportKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            kind,
            location: None,
            coordinates: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Sets `name` only when the API supplied a value for it.
    pub fn set_opt<V: Into<FieldValue>>(&mut self, name: &str, value: Option<V>) {
        if let Some(v) = value {
            self.set(name, v);
        }
    }

    /// A report is persisted only if it names a location.
    pub fn is_valid(&self) -> bool {
        self.location.as_deref().is_some_and(|l| !l.trim().is_empty())
    }

    pub fn has_temperature(&self) -> bool {
        matches!(self.fields.get("temperature"), Some(FieldValue::Float(_)))
    }
}

/// 16-point compass rose, clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompassDirection {
    N,
    NNE,
    NE,
    ENE,
    E,
    ESE,
    SE,
    SSE,
    S,
    SSW,
    SW,
    WSW,
    W,
    WNW,
    NW,
    NNW,
}

impl CompassDirection {
    const ALL: [CompassDirection; 16] = [
        CompassDirection::N,
        CompassDirection::NNE,
        CompassDirection::NE,
        CompassDirection::ENE,
        CompassDirection::E,
        CompassDirection::ESE,
        CompassDirection::SE,
        CompassDirection::SSE,
        CompassDirection::S,
        CompassDirection::SSW,
        CompassDirection::SW,
        CompassDirection::WSW,
        CompassDirection::W,
        CompassDirection::WNW,
        CompassDirection::NW,
        CompassDirection::NNW,
    ];

    /// Nearest compass point for a meteorological wind direction in degrees.
    pub fn from_degrees(deg: f64) -> Self {
        let sector = (deg.rem_euclid(360.0) / 22.5 + 0.5).floor() as usize % 16;
        Self::ALL[sector]
    }
}

impl std::fmt::Display for CompassDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ---------------------------------------------------------------------------
// Broadband measurements
// ---------------------------------------------------------------------------

/// One broadband speed test, as stored in the master table.
///
/// `test_id` is the deduplication key: the master table never holds two
/// records with the same Test-ID.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub measured_at: NaiveDateTime, // local wall-clock time of the test
    pub download_mbit_s: f64,
    pub upload_mbit_s: f64,
    pub latency_ms: u32,
    pub test_id: String,
    pub version: String,
    pub os: String,
    pub browser: String,
}

// ---------------------------------------------------------------------------
// Time-series points
// ---------------------------------------------------------------------------

/// One write to the time-series database.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub time: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a sensor acquisition produced no reading.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireError {
    /// The helper kept reporting transient failures past the retry ceiling.
    RetriesExhausted { retries: u32 },
    /// The helper reported that the sensor is in use. Never retried.
    Busy,
    /// The helper could not be started or its output could not be read.
    Source(String),
}

impl std::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquireError::RetriesExhausted { retries } => {
                write!(f, "Too many retries ({}), giving up", retries)
            }
            AcquireError::Busy => write!(f, "Sensor busy"),
            AcquireError::Source(msg) => write!(f, "Source error: {}", msg),
        }
    }
}

impl std::error::Error for AcquireError {}

/// A data line that could not be turned into a `SensorReading`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    FieldCount { expected: usize, found: usize },
    InvalidNumber { field: &'static str, value: String },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::FieldCount { expected, found } => {
                write!(f, "Expected {} fields, found {}", expected, found)
            }
            ParseError::InvalidNumber { field, value } => {
                write!(f, "Invalid {} value: '{}'", field, value)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// The first physical bound a reading violates.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Temperature(f64),
    Humidity(i32),
    Battery(f64),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Temperature(t) => write!(f, "Temperature out of range: {}°C", t),
            ValidationError::Humidity(h) => write!(f, "Humidity out of range: {}%", h),
            ValidationError::Battery(b) => write!(f, "Battery voltage out of range: {}V", b),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors that can arise when fetching or decoding OpenWeatherMap data.
#[derive(Debug, PartialEq)]
pub enum WeatherError {
    /// Any response status other than 200 OK.
    HttpError(u16),
    /// The request never produced a response (DNS, connect, timeout).
    RequestError(String),
    /// The response body could not be deserialized.
    ParseError(String),
}

impl std::fmt::Display for WeatherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeatherError::HttpError(code) => write!(f, "HTTP error: {}", code),
            WeatherError::RequestError(msg) => write!(f, "Request error: {}", msg),
            WeatherError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for WeatherError {}

/// Errors raised by a persistence sink.
#[derive(Debug, PartialEq)]
pub enum SinkError {
    /// Local file I/O failed.
    Io(String),
    /// The database did not answer its health check or dropped the connection.
    Unreachable(String),
    /// The database answered but refused the write.
    Rejected(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(msg) => write!(f, "I/O error: {}", msg),
            SinkError::Unreachable(msg) => write!(f, "Database unreachable: {}", msg),
            SinkError::Rejected(msg) => write!(f, "Write rejected: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report() -> WeatherReport {
        WeatherReport::new(
            ReportKind::Current,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_measurement_names_are_distinct() {
        let kinds = [
            ReportKind::Current,
            ReportKind::Forecast,
            ReportKind::Daily,
            ReportKind::Weekly,
        ];
        let names: std::collections::HashSet<_> =
            kinds.iter().map(|k| k.measurement_name()).collect();
        assert_eq!(names.len(), kinds.len());
        assert_eq!(ReportKind::Current.measurement_name(), "current_weather");
        assert_eq!(ReportKind::Forecast.measurement_name(), "forecast_weather");
    }

    #[test]
    fn test_report_without_location_is_invalid() {
        let mut r = report();
        assert!(!r.is_valid());
        r.location = Some("   ".to_string());
        assert!(!r.is_valid());
        r.location = Some("Berlin".to_string());
        assert!(r.is_valid());
    }

    #[test]
    fn test_report_is_valid_without_temperature() {
        let mut r = report();
        r.location = Some("Berlin".to_string());
        assert!(r.is_valid());
        assert!(!r.has_temperature());
        r.set("temperature", 18.5);
        assert!(r.has_temperature());
    }

    #[test]
    fn test_set_opt_skips_missing_values() {
        let mut r = report();
        r.set_opt::<f64>("rain next hour", None);
        r.set_opt("snow next hour", Some(0.3));
        assert!(!r.fields.contains_key("rain next hour"));
        assert_eq!(r.fields.get("snow next hour"), Some(&FieldValue::Float(0.3)));
    }

    #[test]
    fn test_compass_direction_sectors() {
        assert_eq!(CompassDirection::from_degrees(0.0), CompassDirection::N);
        assert_eq!(CompassDirection::from_degrees(11.0), CompassDirection::N);
        assert_eq!(CompassDirection::from_degrees(12.0), CompassDirection::NNE);
        assert_eq!(CompassDirection::from_degrees(90.0), CompassDirection::E);
        assert_eq!(CompassDirection::from_degrees(225.0), CompassDirection::SW);
        assert_eq!(CompassDirection::from_degrees(350.0), CompassDirection::N);
        assert_eq!(CompassDirection::from_degrees(-90.0), CompassDirection::W);
        assert_eq!(CompassDirection::from_degrees(337.5), CompassDirection::NNW);
    }

    #[test]
    fn test_field_layout_counts() {
        assert_eq!(FieldLayout::Basic.field_count(), 3);
        assert_eq!(FieldLayout::WithBattery.field_count(), 4);
    }
}
