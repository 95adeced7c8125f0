//! Persistence targets for validated readings.
//!
//! A reading may go to several sinks; each write is independent and a
//! failure in one never blocks the others. Nothing is queued: a reading
//! that cannot be written is logged and dropped.

pub mod csv;
pub mod tsdb;

use crate::model::{SensorReading, SinkError};

pub trait ReadingSink {
    /// Short name for log messages.
    fn name(&self) -> &'static str;

    fn write_reading(&mut self, reading: &SensorReading) -> Result<(), SinkError>;
}
