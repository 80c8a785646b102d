//! Background delivery queue for outbound email.

use super::{EmailMessage, EmailSender};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Exponential backoff between delivery attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// No sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

/// Handle for queuing mail; cheap to clone.
#[derive(Clone)]
pub struct MailQueue {
    tx: mpsc::Sender<EmailMessage>,
}

impl MailQueue {
    /// Start `workers` delivery tasks on the current runtime.
    pub fn spawn(
        sender: Arc<dyn EmailSender>,
        capacity: usize,
        workers: usize,
        policy: RetryPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<EmailMessage>(capacity.max(1));
        let shared_rx = Arc::new(Mutex::new(rx));

        for i in 0..workers.max(1) {
            let sender = sender.clone();
            let rx = shared_rx.clone();
            tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    let Some(message) = next else {
                        break;
                    };
                    deliver_with_retry(sender.as_ref(), &message, policy, i).await;
                }
                debug!(worker = i, "Mail worker stopped");
            });
        }

        Self { tx }
    }

    /// Queue `message` without waiting. Returns `false` (and logs) when the
    /// queue is full or shut down; the caller carries on either way.
    pub fn enqueue(&self, message: EmailMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(recipient = %message.recipient, "Mail queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                error!(recipient = %message.recipient, "Mail queue closed, dropping message");
                false
            }
        }
    }
}

/// Returns whether the message was eventually delivered.
pub async fn deliver_with_retry(
    sender: &dyn EmailSender,
    message: &EmailMessage,
    policy: RetryPolicy,
    worker: usize,
) -> bool {
    let mut backoff = policy.initial_backoff;

    for attempt in 1..=policy.max_attempts {
        match sender.send(message).await {
            Ok(()) => {
                info!(worker, recipient = %message.recipient, subject = %message.subject, "📧 Email sent");
                return true;
            }
            Err(e) => {
                warn!(
                    worker,
                    recipient = %message.recipient,
                    attempt,
                    error = %e,
                    "Email delivery failed"
                );
            }
        }

        if attempt < policy.max_attempts {
            sleep(backoff).await;
            backoff = (backoff * 2).min(policy.max_backoff);
        }
    }

    error!(
        worker,
        recipient = %message.recipient,
        attempts = policy.max_attempts,
        "Giving up on email delivery"
    );
    false
}
