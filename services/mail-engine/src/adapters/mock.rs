//! Scriptable in-memory collaborators for the test suite and local runs.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{EmailMessage, EmailSender, QueryExecutor, ResultSet};
use crate::errors::{EngineError, Result};

/// Query executor that serves a canned result set.
pub struct MockQueryExecutor {
    latency_ms: u64,
    result: Arc<RwLock<ResultSet>>,
    fail_with: Arc<RwLock<Option<String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockQueryExecutor {
    pub fn new(latency_ms: u64) -> Self {
        Self {
            latency_ms,
            result: Arc::new(RwLock::new(ResultSet::default())),
            fail_with: Arc::new(RwLock::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn set_result(&self, result: ResultSet) {
        *self.result.write().await = result;
    }

    pub async fn fail_with(&self, message: &str) {
        *self.fail_with.write().await = Some(message.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for MockQueryExecutor {
    async fn execute(&self, query_text: &str) -> Result<ResultSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        info!(query = query_text, "mock executor: running query");

        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        if let Some(message) = self.fail_with.read().await.clone() {
            warn!("mock executor: simulated query failure");
            return Err(EngineError::QueryExecution(message));
        }

        Ok(self.result.read().await.clone())
    }
}

/// Email sender that records every message and fails on demand.
pub struct MockEmailSender {
    latency_ms: u64,
    fail_all: Arc<RwLock<bool>>,
    fail_recipients: Arc<RwLock<HashSet<String>>>,
    sent: Arc<RwLock<Vec<EmailMessage>>>,
}

impl MockEmailSender {
    pub fn new(latency_ms: u64) -> Self {
        Self {
            latency_ms,
            fail_all: Arc::new(RwLock::new(false)),
            fail_recipients: Arc::new(RwLock::new(HashSet::new())),
            sent: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn fail_all(&self) {
        *self.fail_all.write().await = true;
    }

    /// Fail any message addressed to this recipient.
    pub async fn fail_recipient(&self, recipient: &str) {
        self.fail_recipients
            .write()
            .await
            .insert(recipient.to_string());
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.read().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.read().await.len()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        if *self.fail_all.read().await {
            warn!("mock mailer: simulated relay outage");
            return Err(EngineError::EmailSend("simulated relay outage".to_string()));
        }

        let failing = self.fail_recipients.read().await;
        if let Some(bad) = message.to.iter().find(|r| failing.contains(r.as_str())) {
            warn!(recipient = %bad, "mock mailer: simulated recipient failure");
            return Err(EngineError::EmailSend(format!(
                "mailbox unavailable: {}",
                bad
            )));
        }
        drop(failing);

        self.sent.write().await.push(message.clone());
        Ok(())
    }
}
