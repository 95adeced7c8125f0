//! Service configuration.
//!
//! Built once at start-up from an optional TOML file and the environment
//! (a `.env` file is honoured through `dotenv`), then passed by reference
//! into each pipeline. Environment values win over file values; secrets
//! (API key, database credentials) are expected to come from the
//! environment only.
//!
//! Every key has a default, so an empty or missing file is a valid
//! configuration for the sensor and broadband pipelines. The weather
//! pipeline additionally needs `API_KEY`, `LAT` and `LON`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::logging::LogLevel;
use crate::model::FieldLayout;
use crate::sensor::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "homemon.toml";

/// Largest day count the daily forecast endpoint accepts.
pub const MAX_FORECAST_DAYS: u8 = 16;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(String),
    MissingEnv(&'static str),
    InvalidValue { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Cannot read config file {}: {}", path.display(), source)
            }
            ConfigError::Parse(msg) => write!(f, "Invalid config file: {}", msg),
            ConfigError::MissingEnv(name) => write!(f, "Environment variable {} is not set", name),
            ConfigError::InvalidValue { name, value } => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Directory searched for helper scripts when none are named explicitly.
    pub scripts_dir: PathBuf,
    pub script_pattern: String,
    /// Interpreter the helpers are run with.
    pub shell: String,
    pub layout: FieldLayout,
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub csv_path: PathBuf,
    pub write_csv: bool,
    pub write_tsdb: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("sensors"),
            script_pattern: "*Mi_Temp_Humid_*.sh".to_string(),
            shell: "sh".to_string(),
            layout: FieldLayout::WithBattery,
            max_retries: 3,
            base_delay_secs: 1,
            csv_path: PathBuf::from("data/temperature.csv"),
            write_csv: true,
            write_tsdb: true,
        }
    }
}

impl SensorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(self.base_delay_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub units: String,
    pub lang: String,
    pub timeout_secs: u64,
    /// Forecast breadth when `--days` is not given.
    pub days: u8,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            api_key: None,
            lat: None,
            lon: None,
            units: "metric".to_string(),
            lang: "de".to_string(),
            timeout_secs: 30,
            days: 7,
        }
    }
}

/// Weather API credentials, present only once validated.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherCredentials {
    pub api_key: String,
    pub lat: f64,
    pub lon: f64,
}

impl WeatherConfig {
    pub fn credentials(&self) -> Result<WeatherCredentials, ConfigError> {
        Ok(WeatherCredentials {
            api_key: self
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or(ConfigError::MissingEnv("API_KEY"))?,
            lat: self.lat.ok_or(ConfigError::MissingEnv("LAT"))?,
            lon: self.lon.ok_or(ConfigError::MissingEnv("LON"))?,
        })
    }
}

/// Checks a forecast day count against the API's 1–16 range.
pub fn validate_days(days: u8) -> Result<u8, ConfigError> {
    if (1..=MAX_FORECAST_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ConfigError::InvalidValue {
            name: "days",
            value: days.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BroadbandConfig {
    pub export_dir: PathBuf,
    pub file_pattern: String,
    pub master_file: PathBuf,
    /// Browser used by the external speed-test run; only checked by `verify`.
    pub browser_executable: Option<PathBuf>,
}

impl Default for BroadbandConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("export"),
            file_pattern: "Breitbandmessung_*.csv".to_string(),
            master_file: PathBuf::from("export/data.csv"),
            browser_executable: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TsdbBackend {
    #[default]
    Influx,
    Postgres,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub timeout_secs: u64,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            username: String::new(),
            password: String::new(),
            database: "home".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct TsdbConfig {
    pub backend: TsdbBackend,
    pub influx: InfluxConfig,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            timestamps: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorConfig,
    pub weather: WeatherConfig,
    pub broadband: BroadbandConfig,
    pub tsdb: TsdbConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads `.env`, the config file and the environment.
    ///
    /// With no explicit `path`, `homemon.toml` in the working directory is
    /// used if it exists; otherwise defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlays environment variables read through `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("API_KEY") {
            self.weather.api_key = Some(v);
        }
        if let Some(v) = get("LAT") {
            self.weather.lat = Some(parse_env("LAT", &v)?);
        }
        if let Some(v) = get("LON") {
            self.weather.lon = Some(parse_env("LON", &v)?);
        }

        let influx = &mut self.tsdb.influx;
        if let Some(v) = get("INFLUXDB_HOST") {
            influx.host = v;
        }
        if let Some(v) = get("INFLUXDB_PORT") {
            influx.port = parse_env("INFLUXDB_PORT", &v)?;
        }
        if let Some(v) = get("INFLUXDB_USER") {
            influx.username = v;
        }
        if let Some(v) = get("INFLUXDB_PASSWORD") {
            influx.password = v;
        }
        if let Some(v) = get("INFLUXDB_DATABASE") {
            influx.database = v;
        }
        if let Some(v) = get("DATABASE_URL") {
            self.tsdb.database_url = Some(v);
        }

        if let Some(v) = get("FIREFOX_EXE") {
            self.broadband.browser_executable = Some(PathBuf::from(v));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}
