//! Transactional email.
//!
//! Handlers never talk to the mail provider directly: they push an
//! [`EmailMessage`] onto the [`MailQueue`], whose workers deliver it through an
//! [`EmailSender`] with retry and backoff.

pub mod mailer;
pub mod queue;

use async_trait::async_trait;
use serde::Serialize;

pub use mailer::{HttpMailer, LogMailer};
pub use queue::{MailQueue, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub recipient: String,
}

/// Outbound email collaborator.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}
