//! Physical plausibility bounds for sensor readings.
//!
//! The helpers occasionally decode garbage from a weak Bluetooth link
//! (e.g. 75°C in a kitchen, or a negative humidity). Such readings are
//! dropped rather than persisted. All bounds are inclusive.

use std::ops::RangeInclusive;

use crate::model::{SensorReading, ValidationError};

pub const TEMPERATURE_RANGE_C: RangeInclusive<f64> = -10.0..=60.0;
pub const HUMIDITY_RANGE_PCT: RangeInclusive<i32> = 0..=100;
pub const BATTERY_RANGE_V: RangeInclusive<f64> = 2.5..=3.5;

/// Returns the first bound `reading` violates, checked in field order.
///
/// NaN never lies within a range, so a helper printing `nan` is rejected here.
pub fn validate(reading: &SensorReading) -> Result<(), ValidationError> {
    if !TEMPERATURE_RANGE_C.contains(&reading.temperature_c) {
        return Err(ValidationError::Temperature(reading.temperature_c));
    }
    if !HUMIDITY_RANGE_PCT.contains(&reading.humidity_pct) {
        return Err(ValidationError::Humidity(reading.humidity_pct));
    }
    if let Some(battery) = reading.battery_v {
        if !BATTERY_RANGE_V.contains(&battery) {
            return Err(ValidationError::Battery(battery));
        }
    }
    Ok(())
}

pub fn is_valid(reading: &SensorReading) -> bool {
    validate(reading).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reading(temperature_c: f64, humidity_pct: i32, battery_v: Option<f64>) -> SensorReading {
        SensorReading {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            location: "Kitchen".to_string(),
            temperature_c,
            humidity_pct,
            battery_v,
        }
    }

    #[test]
    fn test_typical_reading_is_valid() {
        assert!(is_valid(&reading(22.5, 45, Some(3.1))));
        assert!(is_valid(&reading(22.5, 45, None)));
    }

    #[test]
    fn test_temperature_bounds_are_inclusive() {
        assert!(is_valid(&reading(-10.0, 50, None)));
        assert!(is_valid(&reading(60.0, 50, None)));
        assert_eq!(
            validate(&reading(-10.1, 50, None)),
            Err(ValidationError::Temperature(-10.1))
        );
        assert_eq!(
            validate(&reading(60.1, 50, None)),
            Err(ValidationError::Temperature(60.1))
        );
    }

    #[test]
    fn test_humidity_bounds_are_inclusive() {
        assert!(is_valid(&reading(20.0, 0, None)));
        assert!(is_valid(&reading(20.0, 100, None)));
        assert_eq!(validate(&reading(20.0, -1, None)), Err(ValidationError::Humidity(-1)));
        assert_eq!(validate(&reading(20.0, 101, None)), Err(ValidationError::Humidity(101)));
    }

    #[test]
    fn test_battery_only_checked_when_present() {
        assert!(is_valid(&reading(20.0, 50, Some(2.5))));
        assert!(is_valid(&reading(20.0, 50, Some(3.5))));
        assert_eq!(
            validate(&reading(20.0, 50, Some(2.4))),
            Err(ValidationError::Battery(2.4))
        );
        assert_eq!(
            validate(&reading(20.0, 50, Some(3.6))),
            Err(ValidationError::Battery(3.6))
        );
    }

    #[test]
    fn test_out_of_range_temperature_from_example_line() {
        assert_eq!(
            validate(&reading(75.0, 45, Some(3.1))),
            Err(ValidationError::Temperature(75.0))
        );
    }

    #[test]
    fn test_nan_temperature_is_invalid() {
        assert!(!is_valid(&reading(f64::NAN, 45, None)));
    }
}
