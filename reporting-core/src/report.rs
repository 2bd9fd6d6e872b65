//! Scheduled report aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::next_run::next_run_at;
use crate::schedule::{Frequency, ScheduleDay, TimeOfDay};

/// A report definition with its recurring mail schedule.
///
/// `next_run_at` is the only field the sweep consults for due-ness. It is
/// computed from "now" at creation, whenever schedule fields change, and
/// after each successful run; it is never derived by adding an interval
/// to its previous value, so downtime cannot produce catch-up storms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledReport {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable name, also used for attachment filenames
    pub report_name: String,
    /// Optional free-form description
    pub description: Option<String>,
    /// Data-fetch statement run to produce the report rows
    pub query_text: String,
    /// Sender address
    pub mail_from: String,
    /// Destination addresses; must be non-empty for the schedule to be
    /// actionable
    pub recipients: Vec<String>,
    /// Subject template; a default is rendered when absent
    pub mail_subject: Option<String>,
    /// HTML body template; a default is rendered when absent
    pub mail_body: Option<String>,
    /// Recurrence frequency
    pub frequency: Frequency,
    /// Target weekday, meaningful only for weekly schedules
    pub schedule_day: Option<ScheduleDay>,
    /// Civil IST time of day the report fires
    pub schedule_time: TimeOfDay,
    /// Inactive reports are never selected by the sweep
    pub is_active: bool,
    /// Set only after a successful execution
    pub last_run_at: Option<DateTime<Utc>>,
    /// Next due instant, stored and compared as UTC
    pub next_run_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl ScheduledReport {
    /// Next scheduled instant strictly after `now`, per this report's
    /// frequency, time-of-day and weekday.
    pub fn compute_next_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_run_at(self.frequency, self.schedule_time, self.schedule_day, now)
    }

    /// Whether the report is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_run_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(now: DateTime<Utc>) -> ScheduledReport {
        ScheduledReport {
            id: Uuid::new_v4(),
            report_name: "Daily Sales".to_string(),
            description: None,
            query_text: "SELECT 1".to_string(),
            mail_from: "reports@example.com".to_string(),
            recipients: vec!["ops@example.com".to_string()],
            mail_subject: None,
            mail_body: None,
            frequency: Frequency::Daily,
            schedule_day: None,
            schedule_time: TimeOfDay::new(9, 30).unwrap(),
            is_active: true,
            last_run_at: None,
            next_run_at: next_run_at(
                Frequency::Daily,
                TimeOfDay::new(9, 30).unwrap(),
                None,
                now,
            ),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn freshly_scheduled_report_is_not_due() {
        let now = Utc::now();
        let report = report(now);
        assert!(!report.is_due(now));
        assert!(report.next_run_at > now);
    }

    #[test]
    fn report_becomes_due_once_next_run_passes() {
        let now = Utc::now();
        let report = report(now);
        assert!(report.is_due(report.next_run_at));
    }

    #[test]
    fn inactive_report_is_never_due() {
        let now = Utc::now();
        let mut report = report(now);
        report.is_active = false;
        assert!(!report.is_due(report.next_run_at + chrono::Duration::days(30)));
    }
}
