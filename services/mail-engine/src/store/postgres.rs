use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reporting_core::{Frequency, ScheduleDay, ScheduledReport, TimeOfDay};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use super::{AdvanceOutcome, ReportStore, ScheduleFields};
use crate::errors::Result;

const REPORT_COLUMNS: &str = r#"
    id,
    report_name,
    description,
    query_text,
    mail_from,
    mail_to,
    mail_subject,
    mail_body,
    schedule_frequency,
    schedule_day,
    schedule_time,
    is_active,
    last_run_at,
    next_run_at,
    created_at,
    updated_at
"#;

/// Report store over the `auto_mail_reports` table.
///
/// Schedule enums and the time-of-day live in the database as the
/// lowercase strings the rest of the system writes; they are parsed into
/// the closed domain types here, once, on the way out.
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> Result<ScheduledReport> {
        let frequency: String = row.try_get("schedule_frequency")?;
        let schedule_day: Option<String> = row.try_get("schedule_day")?;
        let schedule_time: String = row.try_get("schedule_time")?;

        Ok(ScheduledReport {
            id: row.try_get("id")?,
            report_name: row.try_get("report_name")?,
            description: row.try_get("description")?,
            query_text: row.try_get("query_text")?,
            mail_from: row.try_get("mail_from")?,
            recipients: row.try_get("mail_to")?,
            mail_subject: row.try_get("mail_subject")?,
            mail_body: row.try_get("mail_body")?,
            frequency: frequency.parse::<Frequency>()?,
            schedule_day: schedule_day
                .map(|d| d.parse::<ScheduleDay>())
                .transpose()?,
            schedule_time: schedule_time.parse::<TimeOfDay>()?,
            is_active: row.try_get("is_active")?,
            last_run_at: row.try_get("last_run_at")?,
            next_run_at: row.try_get("next_run_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn fetch_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledReport>> {
        let query = format!(
            "SELECT {} FROM auto_mail_reports \
             WHERE is_active = TRUE AND next_run_at <= $1 \
             ORDER BY next_run_at ASC",
            REPORT_COLUMNS
        );

        let rows = sqlx::query(&query).bind(now).fetch_all(&self.pool).await?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<ScheduledReport>> {
        let query = format!(
            "SELECT {} FROM auto_mail_reports WHERE id = $1",
            REPORT_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn insert_report(&self, report: &ScheduledReport) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auto_mail_reports
            (id, report_name, description, query_text, mail_from, mail_to,
             mail_subject, mail_body, schedule_frequency, schedule_day,
             schedule_time, is_active, last_run_at, next_run_at,
             created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(report.id)
        .bind(&report.report_name)
        .bind(&report.description)
        .bind(&report.query_text)
        .bind(&report.mail_from)
        .bind(&report.recipients)
        .bind(&report.mail_subject)
        .bind(&report.mail_body)
        .bind(report.frequency.as_str())
        .bind(report.schedule_day.map(|d| d.as_str()))
        .bind(report.schedule_time.to_string())
        .bind(report.is_active)
        .bind(report.last_run_at)
        .bind(report.next_run_at)
        .bind(report.created_at)
        .bind(report.updated_at)
        .execute(&self.pool)
        .await?;

        info!(report_id = %report.id, next_run_at = %report.next_run_at, "report created");
        Ok(())
    }

    async fn update_schedule(
        &self,
        id: Uuid,
        fields: ScheduleFields,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let next_run = fields.next_run(now);

        sqlx::query(
            r#"
            UPDATE auto_mail_reports
            SET schedule_frequency = $2,
                schedule_day = $3,
                schedule_time = $4,
                next_run_at = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(fields.frequency.as_str())
        .bind(fields.schedule_day.map(|d| d.as_str()))
        .bind(fields.schedule_time.to_string())
        .bind(next_run)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(report_id = %id, next_run_at = %next_run, "schedule updated");
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE auto_mail_reports
            SET is_active = $2,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn advance_schedule(
        &self,
        id: Uuid,
        expected_next_run: DateTime<Utc>,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<AdvanceOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE auto_mail_reports
            SET last_run_at = $3,
                next_run_at = $4,
                updated_at = $3
            WHERE id = $1
              AND next_run_at = $2
            "#,
        )
        .bind(id)
        .bind(expected_next_run)
        .bind(last_run)
        .bind(next_run)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(AdvanceOutcome::Advanced)
        } else {
            Ok(AdvanceOutcome::Conflict)
        }
    }
}
