//! Rendering of CSV attachments and outbound email content.

use chrono::{DateTime, Utc};
use reporting_core::{ist_civil, ScheduledReport};
use serde_json::Value;

use crate::adapters::{Attachment, EmailMessage, ResultSet};

/// Render a result set as CSV text.
///
/// Columns come from the query result's field names in their natural
/// order; when none can be determined a single `Column1` header is
/// synthesized. Fields containing commas, quotes or newlines are quoted
/// with embedded quotes doubled; rows are joined with CRLF.
pub fn render_csv(result: &ResultSet) -> String {
    let columns: Vec<String> = if result.columns.is_empty() {
        vec!["Column1".to_string()]
    } else {
        result.columns.clone()
    };

    let mut lines = Vec::with_capacity(result.rows.len() + 1);
    lines.push(columns.join(","));

    for row in &result.rows {
        let fields: Vec<String> = columns
            .iter()
            .map(|col| escape_field(&field_text(row.get(col))))
            .collect();
        lines.push(fields.join(","));
    }

    lines.join("\r\n")
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Attachment filename: report name with non-alphanumerics collapsed to
/// underscores, suffixed with the UTC date.
pub fn csv_filename(report_name: &str, now: DateTime<Utc>) -> String {
    let safe: String = report_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}.csv", safe, now.format("%Y-%m-%d"))
}

/// Render the result set into a CSV attachment for this report.
pub fn csv_attachment(
    report_name: &str,
    result: &ResultSet,
    now: DateTime<Utc>,
) -> Attachment {
    Attachment {
        filename: csv_filename(report_name, now),
        content: render_csv(result).into_bytes(),
        mime_type: "text/csv".to_string(),
    }
}

/// Subject line, falling back to a standard one when the template is
/// absent or blank.
pub fn subject_for(report: &ScheduledReport) -> String {
    match &report.mail_subject {
        Some(subject) if !subject.trim().is_empty() => subject.clone(),
        _ => format!("Scheduled Report: {}", report.report_name),
    }
}

/// HTML body, falling back to the standard template when absent.
pub fn body_for(report: &ScheduledReport, row_count: usize, now: DateTime<Utc>) -> String {
    match &report.mail_body {
        Some(body) if !body.trim().is_empty() => body.clone(),
        _ => default_body(report, row_count, now),
    }
}

fn default_body(report: &ScheduledReport, row_count: usize, now: DateTime<Utc>) -> String {
    let generated_at = ist_civil(now).format("%d-%m-%Y %H:%M IST");
    format!(
        "<html><body>\
         <h2>{name}</h2>\
         <p>This is your scheduled report generated on {generated_at}.</p>\
         <p><strong>Report Name:</strong> {name}<br>\
         <strong>Frequency:</strong> {frequency}<br>\
         <strong>Records:</strong> {row_count}</p>\
         <p>Please find the complete report data in the attached CSV file.</p>\
         <hr>\
         <p>This is an automated email. Please do not reply to this message.</p>\
         </body></html>",
        name = report.report_name,
        frequency = report.frequency,
        generated_at = generated_at,
        row_count = row_count,
    )
}

/// Assemble the outbound message for the given recipients.
pub fn build_message(
    report: &ScheduledReport,
    to: Vec<String>,
    attachment: Attachment,
    row_count: usize,
    now: DateTime<Utc>,
) -> EmailMessage {
    EmailMessage {
        to,
        from: report.mail_from.clone(),
        subject: subject_for(report),
        html_body: body_for(report, row_count, now),
        attachment,
    }
}
