//! Schedule value types
//!
//! Frequency, day-of-week and time-of-day are persisted as lowercase
//! strings; they are parsed into these closed enums exactly once at the
//! storage boundary so the rest of the system never threads raw strings.

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

/// How often a scheduled report fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every day at the scheduled time
    Daily,
    /// Every week on the scheduled day
    Weekly,
    /// The 1st of every month
    Monthly,
    /// The 1st of every quarter (January, April, July, October)
    Quarterly,
}

impl Frequency {
    /// Persisted string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            other => Err(ScheduleError::UnknownFrequency(other.to_string())),
        }
    }
}

/// Day of the week for weekly schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ScheduleDay {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl ScheduleDay {
    /// Persisted string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleDay::Sunday => "sunday",
            ScheduleDay::Monday => "monday",
            ScheduleDay::Tuesday => "tuesday",
            ScheduleDay::Wednesday => "wednesday",
            ScheduleDay::Thursday => "thursday",
            ScheduleDay::Friday => "friday",
            ScheduleDay::Saturday => "saturday",
        }
    }

    /// Corresponding calendar weekday
    pub fn weekday(&self) -> Weekday {
        match self {
            ScheduleDay::Sunday => Weekday::Sun,
            ScheduleDay::Monday => Weekday::Mon,
            ScheduleDay::Tuesday => Weekday::Tue,
            ScheduleDay::Wednesday => Weekday::Wed,
            ScheduleDay::Thursday => Weekday::Thu,
            ScheduleDay::Friday => Weekday::Fri,
            ScheduleDay::Saturday => Weekday::Sat,
        }
    }
}

impl fmt::Display for ScheduleDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScheduleDay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sunday" => Ok(ScheduleDay::Sunday),
            "monday" => Ok(ScheduleDay::Monday),
            "tuesday" => Ok(ScheduleDay::Tuesday),
            "wednesday" => Ok(ScheduleDay::Wednesday),
            "thursday" => Ok(ScheduleDay::Thursday),
            "friday" => Ok(ScheduleDay::Friday),
            "saturday" => Ok(ScheduleDay::Saturday),
            other => Err(ScheduleError::UnknownScheduleDay(other.to_string())),
        }
    }
}

/// Civil time of day in the IST calendar, minute resolution
///
/// Validated at construction so next-run calculation never has to
/// re-check it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// Build a time of day, rejecting out-of-range components
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidTimeOfDay(format!(
                "{:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Hour component (0-23)
    pub fn hour(&self) -> u8 {
        self.hour
    }

    /// Minute component (0-59)
    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleError;

    /// Parse the persisted "HH:MM" form
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScheduleError::InvalidTimeOfDay(s.to_string());
        let (hour, minute) = s.split_once(':').ok_or_else(invalid)?;
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        TimeOfDay::new(hour, minute).map_err(|_| invalid())
    }
}
