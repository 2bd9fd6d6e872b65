use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Query execution timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("Email send failed: {0}")]
    EmailSend(String),

    #[error("Email send timed out after {0:?}")]
    EmailTimeout(Duration),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid schedule: {0}")]
    Schedule(#[from] reporting_core::ScheduleError),

    #[error("Report not found: {0}")]
    ReportNotFound(Uuid),

    #[error("Report {0} is inactive")]
    ReportInactive(Uuid),

    #[error("Query returned no rows for report {0}")]
    EmptyResult(Uuid),

    #[error("Configuration error: {0}")]
    Config(String),
}
