//! The user-triggered on-demand run path.
//!
//! Differs from the sweep deliberately: the due-time check is bypassed,
//! each recipient gets their own message with independently tracked
//! success/failure, and the schedule bookkeeping is written once after
//! all sends were attempted, as long as the query itself succeeded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use reporting_core::ScheduledReport;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::{Attachment, EmailSender, QueryExecutor};
use crate::errors::{EngineError, Result};
use crate::render;
use crate::store::{AdvanceOutcome, ReportStore};
use crate::sweeper::ExecutionTimeouts;

/// Per-recipient delivery outcome for an on-demand run.
#[derive(Debug, Clone, Serialize)]
pub struct RecipientOutcome {
    pub recipient: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Result of an on-demand run whose query succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub report_id: Uuid,
    pub row_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub recipients: Vec<RecipientOutcome>,
    pub next_run_at: DateTime<Utc>,
}

/// Runs a report immediately, outside its schedule.
pub struct ReportRunner {
    store: Arc<dyn ReportStore>,
    executor: Arc<dyn QueryExecutor>,
    mailer: Arc<dyn EmailSender>,
    timeouts: ExecutionTimeouts,
}

impl ReportRunner {
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

    /// Execute the report now and mail each recipient individually.
    ///
    /// Query failure (or an empty result, on this path only) aborts the
    /// run before any recipient is contacted and leaves the schedule
    /// fields untouched.
    pub async fn run_now(&self, report_id: Uuid, now: DateTime<Utc>) -> Result<RunResult> {
        let report = self
            .store
            .fetch_by_id(report_id)
            .await?
            .ok_or(EngineError::ReportNotFound(report_id))?;

        if !report.is_active {
            return Err(EngineError::ReportInactive(report_id));
        }

        info!(report_id = %report_id, report_name = report.report_name, "running report on demand");

        let result = match timeout(
            self.timeouts.query,
            self.executor.execute(&report.query_text),
        )
        .await
        {
            Err(_) => return Err(EngineError::QueryTimeout(self.timeouts.query)),
            Ok(result) => result?,
        };

        if result.rows.is_empty() {
            return Err(EngineError::EmptyResult(report_id));
        }

        let row_count = result.row_count();
        let attachment = render::csv_attachment(&report.report_name, &result, now);

        // Fan out one message per recipient and await them jointly;
        // one failing mailbox never blocks the others.
        let sends = report
            .recipients
            .iter()
            .map(|recipient| self.send_to(&report, recipient, attachment.clone(), row_count, now));
        let recipients = join_all(sends).await;

        // Bookkeeping is written once, after all sends were attempted,
        // regardless of individual recipient failures.
        let next_run = report.compute_next_run(now);
        match self
            .store
            .advance_schedule(report.id, report.next_run_at, now, next_run)
            .await
        {
            Ok(AdvanceOutcome::Advanced) => {}
            Ok(AdvanceOutcome::Conflict) => {
                warn!(report_id = %report_id, "schedule already advanced by another process");
            }
            Err(e) => {
                // The emails already went out; surface the bookkeeping
                // failure in the log rather than discarding the result.
                warn!(report_id = %report_id, error = %e, "failed to record run bookkeeping");
            }
        }

        let success_count = recipients.iter().filter(|r| r.success).count();
        Ok(RunResult {
            report_id,
            row_count,
            success_count,
            failure_count: recipients.len() - success_count,
            recipients,
            next_run_at: next_run,
        })
    }

    async fn send_to(
        &self,
        report: &ScheduledReport,
        recipient: &str,
        attachment: Attachment,
        row_count: usize,
        now: DateTime<Utc>,
    ) -> RecipientOutcome {
        let message =
            render::build_message(report, vec![recipient.to_string()], attachment, row_count, now);

        let outcome = match timeout(self.timeouts.send, self.mailer.send(&message)).await {
            Err(_) => Err(EngineError::EmailTimeout(self.timeouts.send)),
            Ok(result) => result,
        };

        match outcome {
            Ok(()) => RecipientOutcome {
                recipient: recipient.to_string(),
                success: true,
                error: None,
            },
            Err(e) => {
                warn!(report_id = %report.id, recipient = recipient, error = %e, "recipient send failed");
                RecipientOutcome {
                    recipient: recipient.to_string(),
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
