//! The periodic catch-up sweep over due reports.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reporting_core::ScheduledReport;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::{EmailSender, QueryExecutor};
use crate::errors::EngineError;
use crate::render;
use crate::store::{AdvanceOutcome, ReportStore};

/// Bounded timeouts for the two external calls a run makes.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionTimeouts {
    pub query: Duration,
    pub send: Duration,
}

impl Default for ExecutionTimeouts {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(60),
            send: Duration::from_secs(30),
        }
    }
}

/// Outcome of one attempted report in a sweep tick.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub report_id: Uuid,
    pub report_name: String,
    pub success: bool,
    pub row_count: Option<usize>,
    pub email_sent: bool,
    pub error: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl ExecutionOutcome {
    fn failed(report: &ScheduledReport, row_count: Option<usize>, error: String) -> Self {
        Self {
            report_id: report.id,
            report_name: report.report_name.clone(),
            success: false,
            row_count,
            email_sent: false,
            error: Some(error),
            next_run_at: None,
        }
    }
}

/// Executes due reports and advances their schedules.
///
/// One invocation processes everything due at `now`; failures are
/// isolated per report and leave `next_run_at` untouched so the report
/// is retried on the next tick. The guarantee is at-least-once: the
/// schedule only advances after a successful send, through the store's
/// compare-and-set.
pub struct ScheduleSweeper {
    store: Arc<dyn ReportStore>,
    executor: Arc<dyn QueryExecutor>,
    mailer: Arc<dyn EmailSender>,
    timeouts: ExecutionTimeouts,
}

impl ScheduleSweeper {
    pub fn new(
        store: Arc<dyn ReportStore>,
        executor: Arc<dyn QueryExecutor>,
        mailer: Arc<dyn EmailSender>,
        timeouts: ExecutionTimeouts,
    ) -> Self {
        Self {
            store,
            executor,
            mailer,
            timeouts,
        }
    }

    /// Process all reports due at `now`, returning one outcome per
    /// attempted report.
    pub async fn sweep_due_reports(&self, now: DateTime<Utc>) -> Vec<ExecutionOutcome> {
        let due = match self.store.fetch_due(now).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "failed to fetch due reports");
                return Vec::new();
            }
        };

        if due.is_empty() {
            return Vec::new();
        }

        info!(due = due.len(), "processing due reports");

        let mut outcomes = Vec::with_capacity(due.len());
        for report in &due {
            let outcome = self.process_report(report, now).await;
            if outcome.success {
                info!(
                    report_id = %outcome.report_id,
                    report_name = outcome.report_name,
                    rows = outcome.row_count,
                    "report processed"
                );
            } else {
                warn!(
                    report_id = %outcome.report_id,
                    report_name = outcome.report_name,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "report processing failed; will retry next tick"
                );
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn process_report(&self, report: &ScheduledReport, now: DateTime<Utc>) -> ExecutionOutcome {
        // Query failure leaves next_run_at untouched: the report stays
        // due and is retried on the next tick.
        let result = match timeout(
            self.timeouts.query,
            self.executor.execute(&report.query_text),
        )
        .await
        {
            Err(_) => {
                return ExecutionOutcome::failed(
                    report,
                    None,
                    EngineError::QueryTimeout(self.timeouts.query).to_string(),
                )
            }
            Ok(Err(e)) => return ExecutionOutcome::failed(report, None, e.to_string()),
            Ok(Ok(result)) => result,
        };

        // Zero rows is not an error on the scheduled path; the email
        // goes out with an empty attachment.
        let row_count = result.row_count();
        let attachment = render::csv_attachment(&report.report_name, &result, now);
        let message = render::build_message(
            report,
            report.recipients.clone(),
            attachment,
            row_count,
            now,
        );

        // Single multi-recipient message on this path.
        match timeout(self.timeouts.send, self.mailer.send(&message)).await {
            Err(_) => {
                return ExecutionOutcome::failed(
                    report,
                    Some(row_count),
                    EngineError::EmailTimeout(self.timeouts.send).to_string(),
                )
            }
            Ok(Err(e)) => return ExecutionOutcome::failed(report, Some(row_count), e.to_string()),
            Ok(Ok(())) => {}
        }

        let next_run = report.compute_next_run(now);
        match self
            .store
            .advance_schedule(report.id, report.next_run_at, now, next_run)
            .await
        {
            Ok(AdvanceOutcome::Advanced) => ExecutionOutcome {
                report_id: report.id,
                report_name: report.report_name.clone(),
                success: true,
                row_count: Some(row_count),
                email_sent: true,
                error: None,
                next_run_at: Some(next_run),
            },
            Ok(AdvanceOutcome::Conflict) => {
                // Another process already advanced the schedule; its
                // commit stands and this attempt's bookkeeping is
                // dropped without being retried.
                warn!(report_id = %report.id, "schedule already advanced by another process");
                ExecutionOutcome {
                    report_id: report.id,
                    report_name: report.report_name.clone(),
                    success: true,
                    row_count: Some(row_count),
                    email_sent: true,
                    error: Some("schedule already advanced by another process".to_string()),
                    next_run_at: None,
                }
            }
            Err(e) => {
                // The email went out but the bookkeeping write failed;
                // the report stays due and will be resent (at-least-once).
                let mut outcome = ExecutionOutcome::failed(
                    report,
                    Some(row_count),
                    format!("schedule advance failed: {}", e),
                );
                outcome.email_sent = true;
                outcome
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockEmailSender, MockQueryExecutor};
    use crate::adapters::ResultSet;
    use crate::store::memory::MemoryReportStore;
    use crate::store::{build_report, NewReport};
    use chrono::Duration as ChronoDuration;
    use reporting_core::{Frequency, TimeOfDay};
    use serde_json::{json, Map, Value};

    fn new_report(name: &str) -> NewReport {
        NewReport {
            report_name: name.to_string(),
            description: None,
            query_text: format!("SELECT * FROM {}", name),
            mail_from: "reports@example.com".to_string(),
            recipients: vec!["ops@example.com".to_string(), "boss@example.com".to_string()],
            mail_subject: None,
            mail_body: None,
            frequency: Frequency::Daily,
            schedule_day: None,
            schedule_time: TimeOfDay::new(9, 30).unwrap(),
            is_active: true,
        }
    }

    fn sample_rows() -> ResultSet {
        let mut row = Map::new();
        row.insert("region".to_string(), json!("north"));
        row.insert("amount".to_string(), Value::from(1250));
        ResultSet {
            columns: vec!["region".to_string(), "amount".to_string()],
            rows: vec![row],
        }
    }

    struct Harness {
        store: Arc<MemoryReportStore>,
        executor: Arc<MockQueryExecutor>,
        mailer: Arc<MockEmailSender>,
        sweeper: ScheduleSweeper,
    }

    fn harness() -> Harness {
        harness_with(ExecutionTimeouts::default(), 0, 0)
    }

    fn harness_with(
        timeouts: ExecutionTimeouts,
        query_latency_ms: u64,
        send_latency_ms: u64,
    ) -> Harness {
        let store = Arc::new(MemoryReportStore::new());
        let executor = Arc::new(MockQueryExecutor::new(query_latency_ms));
        let mailer = Arc::new(MockEmailSender::new(send_latency_ms));
        let sweeper = ScheduleSweeper::new(
            store.clone(),
            executor.clone(),
            mailer.clone(),
            timeouts,
        );
        Harness {
            store,
            executor,
            mailer,
            sweeper,
        }
    }

    /// Seed a report whose next_run_at is already in the past.
    async fn seed_due(h: &Harness, name: &str) -> reporting_core::ScheduledReport {
        let report = build_report(new_report(name), Utc::now() - ChronoDuration::days(2));
        h.store.insert_report(&report).await.unwrap();
        report
    }

    #[tokio::test]
    async fn successful_sweep_sends_one_message_and_advances() {
        let h = harness();
        h.executor.set_result(sample_rows()).await;
        let report = seed_due(&h, "daily_sales").await;

        let now = Utc::now();
        let outcomes = h.sweeper.sweep_due_reports(now).await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);
        assert!(outcomes[0].email_sent);
        assert_eq!(outcomes[0].row_count, Some(1));

        // One multi-recipient message, not one per recipient.
        let sent = h.mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to.len(), 2);
        assert_eq!(sent[0].subject, "Scheduled Report: daily_sales");
        assert!(sent[0].attachment.filename.ends_with(".csv"));

        let stored = h.store.fetch_by_id(report.id).await.unwrap().unwrap();
        assert_eq!(stored.last_run_at, Some(now));
        assert!(stored.next_run_at > now);
    }

    #[tokio::test]
    async fn second_sweep_at_same_instant_sends_nothing() {
        let h = harness();
        h.executor.set_result(sample_rows()).await;
        seed_due(&h, "daily_sales").await;

        let now = Utc::now();
        let first = h.sweeper.sweep_due_reports(now).await;
        assert_eq!(first.len(), 1);

        let second = h.sweeper.sweep_due_reports(now).await;
        assert!(second.is_empty());
        assert_eq!(h.mailer.sent_count().await, 1);
    }

    #[tokio::test]
    async fn query_failure_leaves_next_run_untouched() {
        let h = harness();
        h.executor.fail_with("relation \"sales\" does not exist").await;
        let report = seed_due(&h, "daily_sales").await;

        let now = Utc::now();
        let outcomes = h.sweeper.sweep_due_reports(now).await;

        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
        let error = outcomes[0].error.as_deref().unwrap();
        assert!(error.contains("Query execution failed"), "got: {}", error);

        let stored = h.store.fetch_by_id(report.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run_at, report.next_run_at);
        assert_eq!(stored.last_run_at, None);
        assert_eq!(h.mailer.sent_count().await, 0);
    }

    #[tokio::test]
    async fn slow_query_hits_the_timeout_and_leaves_next_run_untouched() {
        let timeouts = ExecutionTimeouts {
            query: Duration::from_millis(20),
            send: Duration::from_secs(30),
        };
        let h = harness_with(timeouts, 200, 0);
        h.executor.set_result(sample_rows()).await;
        let report = seed_due(&h, "daily_sales").await;

        let outcomes = h.sweeper.sweep_due_reports(Utc::now()).await;

        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
        assert!(!outcomes[0].email_sent);
        assert_eq!(outcomes[0].row_count, None);
        let error = outcomes[0].error.as_deref().unwrap();
        assert!(error.contains("timed out"), "got: {}", error);
        assert_eq!(h.mailer.sent_count().await, 0);

        let stored = h.store.fetch_by_id(report.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run_at, report.next_run_at);
        assert_eq!(stored.last_run_at, None);
    }

    #[tokio::test]
    async fn slow_relay_hits_the_send_timeout_and_leaves_next_run_untouched() {
        let timeouts = ExecutionTimeouts {
            query: Duration::from_secs(60),
            send: Duration::from_millis(20),
        };
        let h = harness_with(timeouts, 0, 200);
        h.executor.set_result(sample_rows()).await;
        let report = seed_due(&h, "daily_sales").await;

        let outcomes = h.sweeper.sweep_due_reports(Utc::now()).await;

        assert!(!outcomes[0].success);
        assert!(!outcomes[0].email_sent);
        assert_eq!(outcomes[0].row_count, Some(1));
        let error = outcomes[0].error.as_deref().unwrap();
        assert!(error.contains("timed out"), "got: {}", error);
        assert_eq!(h.mailer.sent_count().await, 0);

        let stored = h.store.fetch_by_id(report.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run_at, report.next_run_at);
        assert_eq!(stored.last_run_at, None);
    }

    #[tokio::test]
    async fn send_failure_leaves_next_run_untouched() {
        let h = harness();
        h.executor.set_result(sample_rows()).await;
        h.mailer.fail_all().await;
        let report = seed_due(&h, "daily_sales").await;

        let outcomes = h.sweeper.sweep_due_reports(Utc::now()).await;

        assert!(!outcomes[0].success);
        assert!(!outcomes[0].email_sent);
        assert_eq!(outcomes[0].row_count, Some(1));

        let stored = h.store.fetch_by_id(report.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run_at, report.next_run_at);
    }

    #[tokio::test]
    async fn zero_rows_still_sends_empty_attachment() {
        let h = harness();
        let report = seed_due(&h, "daily_sales").await;

        let now = Utc::now();
        let outcomes = h.sweeper.sweep_due_reports(now).await;

        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].row_count, Some(0));

        let sent = h.mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].attachment.content, b"Column1".to_vec());

        let stored = h.store.fetch_by_id(report.id).await.unwrap().unwrap();
        assert!(stored.next_run_at > report.next_run_at);
    }

    #[tokio::test]
    async fn one_failing_report_does_not_abort_the_others() {
        let h = harness();
        h.executor.set_result(sample_rows()).await;
        let healthy = seed_due(&h, "healthy").await;
        let mut broken = build_report(new_report("broken"), Utc::now() - ChronoDuration::days(2));
        broken.recipients = vec!["dead@example.com".to_string()];
        h.store.insert_report(&broken).await.unwrap();
        h.mailer.fail_recipient("dead@example.com").await;

        let outcomes = h.sweeper.sweep_due_reports(Utc::now()).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.success).count(), 1);

        let stored = h.store.fetch_by_id(healthy.id).await.unwrap().unwrap();
        assert!(stored.last_run_at.is_some());
        let stored = h.store.fetch_by_id(broken.id).await.unwrap().unwrap();
        assert!(stored.last_run_at.is_none());
    }

    #[tokio::test]
    async fn lost_advance_race_does_not_resend() {
        let h = harness();
        h.executor.set_result(sample_rows()).await;
        let report = seed_due(&h, "daily_sales").await;

        // Simulate a concurrent tick committing first.
        let now = Utc::now();
        let winner_next = report.compute_next_run(now);
        h.store
            .advance_schedule(report.id, report.next_run_at, now, winner_next)
            .await
            .unwrap();

        // Process the stale copy directly, as an overlapping tick would.
        let outcome = h.sweeper.process_report(&report, now).await;
        assert!(outcome.email_sent);
        assert!(outcome.next_run_at.is_none());

        let stored = h.store.fetch_by_id(report.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run_at, winner_next);
    }
}
