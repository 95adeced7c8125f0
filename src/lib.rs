//! Home data collector: Bluetooth room sensors, OpenWeatherMap reports and
//! broadband speed-test exports, persisted to CSV files and a time-series
//! database.
//!
//! Each pipeline is a one-shot run (see [`pipeline`]); scheduling is left to
//! cron or systemd timers.

pub mod config;
pub mod csv;
pub mod files;
pub mod ingest;
pub mod logging;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod sensor;
pub mod sink;
pub mod verify;
