//! Time-series database sink.
//!
//! Points carry one tag (`location`), a timestamp and a field map. Two
//! backends implement [`PointWriter`]:
//! - InfluxDB 1.x over its HTTP API (line protocol, `/ping` health check)
//! - PostgreSQL, one row per point in `tsdb_points` with JSONB fields
//!
//! Callers open a [`TimeSeriesSink`] once per run; opening performs the
//! health check, so an unreachable database is detected before any write
//! and the whole batch can be skipped.

use std::collections::BTreeMap;
use std::time::Duration;

use postgres::{Client, NoTls};
use reqwest::StatusCode;

use crate::config::{InfluxConfig, TsdbBackend, TsdbConfig};
use crate::model::{FieldValue, Point, SensorReading, SinkError, WeatherReport};
use crate::sink::ReadingSink;

/// Measurement name for sensor readings.
pub const SENSOR_MEASUREMENT: &str = "room_climate";

const SQL_CREATE_POINTS: &str = "
    CREATE TABLE IF NOT EXISTS tsdb_points (
        measurement TEXT NOT NULL,
        location    TEXT NOT NULL,
        time        TIMESTAMPTZ NOT NULL,
        fields      JSONB NOT NULL
    )";

const SQL_INSERT_POINT: &str =
    "INSERT INTO tsdb_points (measurement, location, time, fields) VALUES ($1, $2, $3, $4)";

pub trait PointWriter {
    fn ping(&mut self) -> Result<(), SinkError>;
    fn write_points(&mut self, points: &[Point]) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// Point construction
// ---------------------------------------------------------------------------

fn location_tag(location: &str) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert("location".to_string(), location.to_string());
    tags
}

impl From<&SensorReading> for Point {
    fn from(reading: &SensorReading) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("temperature".to_string(), FieldValue::Float(reading.temperature_c));
        fields.insert("humidity".to_string(), FieldValue::Int(reading.humidity_pct as i64));
        if let Some(battery) = reading.battery_v {
            fields.insert("battery".to_string(), FieldValue::Float(battery));
        }
        Point {
            measurement: SENSOR_MEASUREMENT.to_string(),
            tags: location_tag(&reading.location),
            time: reading.timestamp,
            fields,
        }
    }
}

impl From<&WeatherReport> for Point {
    fn from(report: &WeatherReport) -> Self {
        Point {
            measurement: report.kind.measurement_name().to_string(),
            tags: location_tag(report.location.as_deref().unwrap_or_default()),
            time: report.timestamp,
            fields: report.fields.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// InfluxDB line protocol
// ---------------------------------------------------------------------------

fn escape(value: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn format_field_value(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Float(v) if v.is_finite() => Some(format!("{:?}", v)),
        FieldValue::Float(_) => None, // NaN/inf are not representable
        FieldValue::Int(v) => Some(format!("{}i", v)),
        FieldValue::Text(s) => Some(format!("\"{}\"", escape(s, &['"', '\\']))),
    }
}

/// Renders one point as a line-protocol record with second precision.
///
/// Empty tag values and non-finite floats are left out. Returns `None` if no
/// field survives, since InfluxDB rejects a line without fields.
pub fn line_protocol(point: &Point) -> Option<String> {
    let mut line = escape(&point.measurement, &[',', ' ']);
    for (key, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape(key, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(value, &[',', '=', ' ']));
    }

    let fields: Vec<String> = point
        .fields
        .iter()
        .filter_map(|(key, value)| {
            format_field_value(value).map(|v| format!("{}={}", escape(key, &[',', '=', ' ']), v))
        })
        .collect();
    if fields.is_empty() {
        return None;
    }

    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(&point.time.timestamp().to_string());
    Some(line)
}

// ---------------------------------------------------------------------------
// InfluxDB backend
// ---------------------------------------------------------------------------

pub struct InfluxWriter {
    http: reqwest::blocking::Client,
    base_url: String,
    database: String,
    username: String,
    password: String,
}

impl InfluxWriter {
    pub fn new(config: &InfluxConfig) -> Result<Self, SinkError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: format!("http://{}:{}", config.host, config.port),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn authed(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        if self.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.password))
        }
    }
}

impl PointWriter for InfluxWriter {
    fn ping(&mut self) -> Result<(), SinkError> {
        let url = format!("{}/ping", self.base_url);
        let response = self
            .authed(self.http.get(&url))
            .send()
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SinkError::Unreachable(format!("ping returned {}", response.status())))
        }
    }

    fn write_points(&mut self, points: &[Point]) -> Result<(), SinkError> {
        let body: Vec<String> = points.iter().filter_map(line_protocol).collect();
        if body.is_empty() {
            return Err(SinkError::Rejected("no writable fields".to_string()));
        }

        let url = format!("{}/write", self.base_url);
        let response = self
            .authed(self.http.post(&url))
            .query(&[("db", self.database.as_str()), ("precision", "s")])
            .body(body.join("\n"))
            .send()
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            status => {
                let detail = response.text().unwrap_or_default();
                Err(SinkError::Rejected(format!("{}: {}", status, detail.trim())))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL backend
// ---------------------------------------------------------------------------

pub struct PostgresWriter {
    client: Client,
}

impl PostgresWriter {
    /// Connects and makes sure the points table exists.
    pub fn connect(database_url: &str) -> Result<Self, SinkError> {
        let mut client = Client::connect(database_url, NoTls)
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;
        client
            .batch_execute(SQL_CREATE_POINTS)
            .map_err(|e| SinkError::Rejected(e.to_string()))?;
        Ok(Self { client })
    }
}

impl PointWriter for PostgresWriter {
    fn ping(&mut self) -> Result<(), SinkError> {
        self.client
            .simple_query("SELECT 1")
            .map(|_| ())
            .map_err(|e| SinkError::Unreachable(e.to_string()))
    }

    fn write_points(&mut self, points: &[Point]) -> Result<(), SinkError> {
        for point in points {
            let location = point.tags.get("location").cloned().unwrap_or_default();
            let fields = serde_json::to_value(&point.fields)
                .map_err(|e| SinkError::Rejected(e.to_string()))?;
            self.client
                .execute(
                    SQL_INSERT_POINT,
                    &[&point.measurement, &location, &point.time, &fields],
                )
                .map_err(|e| {
                    if e.is_closed() {
                        SinkError::Unreachable(e.to_string())
                    } else {
                        SinkError::Rejected(e.to_string())
                    }
                })?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

pub struct TimeSeriesSink {
    writer: Box<dyn PointWriter>,
}

impl TimeSeriesSink {
    /// Wraps `writer` after a successful health check.
    pub fn new(mut writer: Box<dyn PointWriter>) -> Result<Self, SinkError> {
        writer.ping()?;
        Ok(Self { writer })
    }

    /// Builds the configured backend and checks that it answers.
    ///
    /// Returns `Ok(None)` when the time-series backend is disabled.
    pub fn open(config: &TsdbConfig) -> Result<Option<Self>, SinkError> {
        let writer: Box<dyn PointWriter> = match config.backend {
            TsdbBackend::Disabled => return Ok(None),
            TsdbBackend::Influx => Box::new(InfluxWriter::new(&config.influx)?),
            TsdbBackend::Postgres => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    SinkError::Unreachable("DATABASE_URL is not set".to_string())
                })?;
                Box::new(PostgresWriter::connect(url)?)
            }
        };
        Self::new(writer).map(Some)
    }

    pub fn write_point(&mut self, point: &Point) -> Result<(), SinkError> {
        self.writer.write_points(std::slice::from_ref(point))
    }

    pub fn write_report(&mut self, report: &WeatherReport) -> Result<(), SinkError> {
        self.write_point(&Point::from(report))
    }
}

impl ReadingSink for TimeSeriesSink {
    fn name(&self) -> &'static str {
        "tsdb"
    }

    fn write_reading(&mut self, reading: &SensorReading) -> Result<(), SinkError> {
        self.write_point(&Point::from(reading))
    }
}
