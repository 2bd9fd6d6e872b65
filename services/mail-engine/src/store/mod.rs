//! Report persistence
//!
//! The store is the third collaborator seam: the sweep needs "all active
//! reports with `next_run_at <= now`" plus a conditional update on the
//! run-bookkeeping fields. Schedule advancement is an optimistic
//! compare-and-set on the previously read `next_run_at`, so overlapping
//! sweep ticks cannot both commit the same overdue window.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reporting_core::{next_run_at, Frequency, ScheduleDay, ScheduledReport, TimeOfDay};
use uuid::Uuid;

use crate::errors::Result;

/// Result of a conditional schedule advancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The bookkeeping fields were written.
    Advanced,
    /// Another process already advanced the schedule; this attempt's
    /// write was dropped.
    Conflict,
}

/// Definition fields for a new scheduled report.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub report_name: String,
    pub description: Option<String>,
    pub query_text: String,
    pub mail_from: String,
    pub recipients: Vec<String>,
    pub mail_subject: Option<String>,
    pub mail_body: Option<String>,
    pub frequency: Frequency,
    pub schedule_day: Option<ScheduleDay>,
    pub schedule_time: TimeOfDay,
    pub is_active: bool,
}

/// The mutable schedule portion of a report.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleFields {
    pub frequency: Frequency,
    pub schedule_day: Option<ScheduleDay>,
    pub schedule_time: TimeOfDay,
}

impl ScheduleFields {
    /// Next due instant for these fields, computed from `now`.
    pub fn next_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_run_at(self.frequency, self.schedule_time, self.schedule_day, now)
    }
}

/// Materialize a new report with its first `next_run_at` computed from
/// the current instant, never from a stored value.
pub fn build_report(new: NewReport, now: DateTime<Utc>) -> ScheduledReport {
    let next_run = next_run_at(new.frequency, new.schedule_time, new.schedule_day, now);
    ScheduledReport {
        id: Uuid::new_v4(),
        report_name: new.report_name,
        description: new.description,
        query_text: new.query_text,
        mail_from: new.mail_from,
        recipients: new.recipients,
        mail_subject: new.mail_subject,
        mail_body: new.mail_body,
        frequency: new.frequency,
        schedule_day: new.schedule_day,
        schedule_time: new.schedule_time,
        is_active: new.is_active,
        last_run_at: None,
        next_run_at: next_run,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// All active reports whose `next_run_at` is at or before `now`.
    async fn fetch_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledReport>>;

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<ScheduledReport>>;

    async fn insert_report(&self, report: &ScheduledReport) -> Result<()>;

    /// Replace the schedule fields and recompute `next_run_at` from
    /// `now` (schedule edits always reset the due instant).
    async fn update_schedule(
        &self,
        id: Uuid,
        fields: ScheduleFields,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_active(&self, id: Uuid, active: bool, now: DateTime<Utc>) -> Result<()>;

    /// Conditionally write `last_run_at`/`next_run_at`: the update only
    /// applies while the stored `next_run_at` still equals
    /// `expected_next_run` (the value read when the report was picked
    /// up). Returns [`AdvanceOutcome::Conflict`] when another process
    /// got there first.
    async fn advance_schedule(
        &self,
        id: Uuid,
        expected_next_run: DateTime<Utc>,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<AdvanceOutcome>;
}
