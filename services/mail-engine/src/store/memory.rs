//! In-memory report store for the test suite.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reporting_core::ScheduledReport;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AdvanceOutcome, ReportStore, ScheduleFields};
use crate::errors::{EngineError, Result};

#[derive(Default)]
pub struct MemoryReportStore {
    reports: Arc<RwLock<HashMap<Uuid, ScheduledReport>>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn fetch_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledReport>> {
        let reports = self.reports.read().await;
        let mut due: Vec<ScheduledReport> = reports
            .values()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|r| r.next_run_at);
        Ok(due)
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<ScheduledReport>> {
        Ok(self.reports.read().await.get(&id).cloned())
    }

    async fn insert_report(&self, report: &ScheduledReport) -> Result<()> {
        self.reports
            .write()
            .await
            .insert(report.id, report.clone());
        Ok(())
    }

    async fn update_schedule(
        &self,
        id: Uuid,
        fields: ScheduleFields,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut reports = self.reports.write().await;
        let report = reports.get_mut(&id).ok_or(EngineError::ReportNotFound(id))?;
        report.frequency = fields.frequency;
        report.schedule_day = fields.schedule_day;
        report.schedule_time = fields.schedule_time;
        report.next_run_at = fields.next_run(now);
        report.updated_at = now;
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool, now: DateTime<Utc>) -> Result<()> {
        let mut reports = self.reports.write().await;
        let report = reports.get_mut(&id).ok_or(EngineError::ReportNotFound(id))?;
        report.is_active = active;
        report.updated_at = now;
        Ok(())
    }

    async fn advance_schedule(
        &self,
        id: Uuid,
        expected_next_run: DateTime<Utc>,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<AdvanceOutcome> {
        let mut reports = self.reports.write().await;
        let report = reports.get_mut(&id).ok_or(EngineError::ReportNotFound(id))?;
        if report.next_run_at != expected_next_run {
            return Ok(AdvanceOutcome::Conflict);
        }
        report.last_run_at = Some(last_run);
        report.next_run_at = next_run;
        report.updated_at = last_run;
        Ok(AdvanceOutcome::Advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{build_report, NewReport};
    use super::*;
    use chrono::Duration;
    use reporting_core::{Frequency, TimeOfDay};

    fn new_report() -> NewReport {
        NewReport {
            report_name: "Daily Sales".to_string(),
            description: None,
            query_text: "SELECT * FROM sales".to_string(),
            mail_from: "reports@example.com".to_string(),
            recipients: vec!["ops@example.com".to_string()],
            mail_subject: None,
            mail_body: None,
            frequency: Frequency::Daily,
            schedule_day: None,
            schedule_time: TimeOfDay::new(9, 30).unwrap(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn due_query_skips_inactive_and_future_reports() {
        let store = MemoryReportStore::new();
        let now = Utc::now();

        let due = build_report(new_report(), now - Duration::days(2));
        let future = build_report(new_report(), now);
        let mut inactive = build_report(new_report(), now - Duration::days(2));
        inactive.is_active = false;

        store.insert_report(&due).await.unwrap();
        store.insert_report(&future).await.unwrap();
        store.insert_report(&inactive).await.unwrap();

        let found = store.fetch_due(now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn advance_is_conditional_on_expected_next_run() {
        let store = MemoryReportStore::new();
        let now = Utc::now();
        let report = build_report(new_report(), now - Duration::days(2));
        store.insert_report(&report).await.unwrap();

        let next = report.compute_next_run(now);
        let first = store
            .advance_schedule(report.id, report.next_run_at, now, next)
            .await
            .unwrap();
        assert_eq!(first, AdvanceOutcome::Advanced);

        // Second attempt carries the stale expectation and must lose.
        let second = store
            .advance_schedule(report.id, report.next_run_at, now, next)
            .await
            .unwrap();
        assert_eq!(second, AdvanceOutcome::Conflict);

        let stored = store.fetch_by_id(report.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run_at, next);
        assert_eq!(stored.last_run_at, Some(now));
    }

    #[tokio::test]
    async fn schedule_edit_recomputes_next_run_from_now() {
        let store = MemoryReportStore::new();
        let now = Utc::now();
        let report = build_report(new_report(), now - Duration::days(30));
        store.insert_report(&report).await.unwrap();

        let fields = ScheduleFields {
            frequency: Frequency::Monthly,
            schedule_day: None,
            schedule_time: TimeOfDay::new(6, 0).unwrap(),
        };
        store.update_schedule(report.id, fields, now).await.unwrap();

        let stored = store.fetch_by_id(report.id).await.unwrap().unwrap();
        assert_eq!(stored.frequency, Frequency::Monthly);
        assert!(stored.next_run_at > now);
    }
}
