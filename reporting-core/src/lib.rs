//! # ReportRail Reporting Core
//!
//! Pure domain library for recurring report schedules:
//! - Closed schedule enums (frequency, day-of-week, time-of-day) parsed
//!   once at the storage boundary
//! - The `ScheduledReport` aggregate and its run-bookkeeping fields
//! - Next-run calculation in the fixed IST civil calendar (UTC+05:30)
//!
//! ## Safety
//!
//! - `#![forbid(unsafe_code)]`: No unsafe operations
//! - No I/O, no clocks: callers supply the current instant
//! - Next-run results are always strictly in the future relative to the
//!   instant they were computed from

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications, clippy::all)]

pub mod error;
pub mod next_run;
pub mod report;
pub mod schedule;

pub use error::{Result, ScheduleError};
pub use next_run::{ist_civil, next_run_at};
pub use report::ScheduledReport;
pub use schedule::{Frequency, ScheduleDay, TimeOfDay};
