use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::warn;

use super::{QueryExecutor, ResultSet};
use crate::errors::{EngineError, Result};

/// Query executor backed by the reporting database.
///
/// The user query is wrapped as `SELECT row_to_json(t) AS result FROM
/// (...) t`, so every row arrives as one json object whose keys carry
/// the column names in their natural order.
pub struct PgQueryExecutor {
    pool: PgPool,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn execute(&self, query_text: &str) -> Result<ResultSet> {
        let inner = query_text.trim().trim_end_matches(';');
        let wrapped = format!("SELECT row_to_json(t) AS result FROM ({}) t", inner);

        let rows = sqlx::query(&wrapped)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::QueryExecution(e.to_string()))?;

        let mut result = ResultSet::default();
        for row in rows {
            let value: Value = row.try_get("result")?;
            match value {
                Value::Object(map) => {
                    if result.columns.is_empty() {
                        result.columns = map.keys().cloned().collect();
                    }
                    result.rows.push(map);
                }
                other => {
                    // row_to_json always yields objects; anything else
                    // means the wrapping got subverted.
                    warn!(value = %other, "dropping non-object row from report query");
                }
            }
        }

        Ok(result)
    }
}
