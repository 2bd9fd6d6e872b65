//! External collaborator seams
//!
//! The engine never talks to a database or an SMTP relay directly; it
//! goes through these traits so the sweep and on-demand paths can be
//! exercised against scriptable mocks.

pub mod http_mailer;
pub mod mock;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Result;

/// One result row: column name to scalar value, in query order.
pub type JsonRow = Map<String, Value>;

/// Rows produced by a report query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSet {
    /// Field names in their natural query order; may be empty when the
    /// query produced no rows.
    pub columns: Vec<String>,
    /// Row data keyed by column name.
    pub rows: Vec<JsonRow>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A rendered attachment ready for dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub mime_type: String,
}

/// A fully rendered outbound email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub html_body: String,
    pub attachment: Attachment,
}

/// Runs report query text and returns the produced rows.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query_text: &str) -> Result<ResultSet>;
}

/// Dispatches a rendered email to its recipients.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}
