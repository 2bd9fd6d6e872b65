use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmailMessage, EmailSender};
use crate::config::MailerConfig;
use crate::errors::{EngineError, Result};

/// Email sender that posts messages to the mail relay endpoint.
///
/// The relay accepts a JSON body with the recipients, subject, HTML body
/// and a base64-encoded attachment, and answers `{ "success": bool,
/// "error": ... }`.
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    to: &'a [String],
    from: &'a str,
    subject: &'a str,
    html_body: &'a str,
    attachment: RelayAttachment<'a>,
}

#[derive(Serialize)]
struct RelayAttachment<'a> {
    filename: &'a str,
    content_base64: String,
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl HttpEmailSender {
    pub fn new(config: &MailerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let request = RelayRequest {
            to: &message.to,
            from: &message.from,
            subject: &message.subject,
            html_body: &message.html_body,
            attachment: RelayAttachment {
                filename: &message.attachment.filename,
                content_base64: base64::engine::general_purpose::STANDARD
                    .encode(&message.attachment.content),
                mime_type: &message.attachment.mime_type,
            },
        };

        debug!(
            recipients = message.to.len(),
            attachment = %message.attachment.filename,
            "posting email to mail relay"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::EmailSend(format!(
                "mail relay returned {}",
                status
            )));
        }

        let body: RelayResponse = response.json().await?;
        if !body.success {
            return Err(EngineError::EmailSend(
                body.error.unwrap_or_else(|| "unknown relay error".to_string()),
            ));
        }

        Ok(())
    }
}
