//! Error types for schedule parsing and validation

use thiserror::Error;

/// Schedule result type
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Schedule validation errors
///
/// These only occur at the parse/validation boundary (report creation or
/// load from storage). Once a schedule is constructed, next-run
/// calculation is total and never fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Time-of-day outside 00:00..23:59 or not in HH:MM form
    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    /// Frequency string not one of daily/weekly/monthly/quarterly
    #[error("Unknown schedule frequency: {0}")]
    UnknownFrequency(String),

    /// Day-of-week string not a lowercase English weekday name
    #[error("Unknown schedule day: {0}")]
    UnknownScheduleDay(String),
}
