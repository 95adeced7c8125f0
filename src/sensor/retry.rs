//! Retry loop around a sensor helper.
//!
//! Transient failures restart the helper after an exponential backoff of
//! `base_delay * 2^retries` (2 s, 4 s, 8 s … with the default 1 s base) until
//! the retry ceiling is passed. A busy sensor ends the attempt at once.
//! Malformed and out-of-range lines are skipped without counting as a retry.
//!
//! # Sleep injection
//! Backoff goes through the [`Sleeper`] trait so tests can record the delay
//! sequence instead of waiting for it.

use std::time::Duration;

use chrono::Utc;

use crate::logging::{self, DataSource};
use crate::model::{AcquireError, FieldLayout, SensorReading};
use crate::sensor::parse::{SourceLine, interpret_line};
use crate::sensor::source::LineSource;
use crate::sensor::validate::validate;

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt. Exceeding it is terminal.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retries` (1-based).
    pub fn backoff(&self, retries: u32) -> Duration {
        let factor = 1u32.checked_shl(retries).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

pub struct RetryController<S: Sleeper> {
    policy: RetryPolicy,
    layout: FieldLayout,
    sleeper: S,
}

/// How one invocation of the helper ended without producing a reading.
enum AttemptEnd {
    Transient,
    Exhausted,
}

impl<S: Sleeper> RetryController<S> {
    pub fn new(policy: RetryPolicy, layout: FieldLayout, sleeper: S) -> Self {
        Self {
            policy,
            layout,
            sleeper,
        }
    }

    /// Runs `source` until it yields one valid reading or gives up.
    ///
    /// A helper whose output ends without a reading or a status line counts
    /// as a transient failure, so a silently failing helper cannot loop
    /// forever.
    pub fn acquire<L: LineSource>(&mut self, source: &mut L) -> Result<SensorReading, AcquireError> {
        let name = source.name().to_string();
        let mut retries: u32 = 0;

        loop {
            let end = {
                let mut end = AttemptEnd::Exhausted;
                for line in source.start()? {
                    logging::debug(DataSource::Sensor, Some(&name), &format!("helper: {}", line));
                    match interpret_line(&line, self.layout, Utc::now()) {
                        SourceLine::Reading(reading) => match validate(&reading) {
                            Ok(()) => {
                                logging::debug(
                                    DataSource::Sensor,
                                    Some(&name),
                                    &format!("Got data: {:?}", reading),
                                );
                                return Ok(reading);
                            }
                            Err(e) => logging::warn(
                                DataSource::Sensor,
                                Some(&name),
                                &format!("Discarding implausible reading: {}", e),
                            ),
                        },
                        SourceLine::Malformed(e) => logging::warn(
                            DataSource::Sensor,
                            Some(&name),
                            &format!("Skipping line '{}': {}", line, e),
                        ),
                        SourceLine::Busy => {
                            logging::info(DataSource::Sensor, Some(&name), "Sensor busy, not retrying");
                            return Err(AcquireError::Busy);
                        }
                        SourceLine::TransientFailure => {
                            end = AttemptEnd::Transient;
                            break;
                        }
                    }
                }
                end
            };

            if let AttemptEnd::Exhausted = end {
                logging::warn(DataSource::Sensor, Some(&name), "Helper exited without a reading");
            }

            retries += 1;
            if retries > self.policy.max_retries {
                logging::warn(DataSource::Sensor, Some(&name), "Too many retries - giving up");
                return Err(AcquireError::RetriesExhausted {
                    retries: self.policy.max_retries,
                });
            }

            let delay = self.policy.backoff(retries);
            logging::info(
                DataSource::Sensor,
                Some(&name),
                &format!(
                    "Retry {}/{}, backing off for {} seconds",
                    retries,
                    self.policy.max_retries,
                    delay.as_secs_f64()
                ),
            );
            self.sleeper.sleep(delay);
        }
    }
}
