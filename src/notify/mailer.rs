//! Email senders: an HTTP relay client and a log-only fallback.

use super::{EmailMessage, EmailSender};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Posts messages as JSON to a transactional-mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    api_url: String,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: Option<&str>, from: String) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", key)
                    .parse()
                    .context("Invalid MAIL_API_KEY")?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .context("Failed to build mail HTTP client")?;

        Ok(Self {
            client,
            api_url,
            from,
        })
    }
}

#[async_trait]
impl EmailSender for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let body = json!({
            "from": self.from,
            "to": [message.recipient],
            "subject": message.subject,
            "text": message.body,
        });

        let resp = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .context("POST to mail relay failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("mail relay {}: {}", status, text));
        }

        Ok(())
    }
}

/// Development sender: writes the message to the log instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            recipient = %message.recipient,
            subject = %message.subject,
            "📧 Email (log only, no relay configured)"
        );
        // Bodies carry confirmation codes
        debug!(recipient = %message.recipient, body = %message.body, "📧 Email body");
        Ok(())
    }
}
