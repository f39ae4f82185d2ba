//! The send capability the delivery queue depends on.

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single send attempt.
///
/// The queue only distinguishes two kinds: throttling, which is retried with
/// backoff, and everything else, which drops the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("send failed: {0}")]
    Other(String),
}

impl SendError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SendError::RateLimited(_))
    }
}

/// A channel that can deliver a text message to its configured recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempt to deliver `message` once.
    async fn send(&self, message: &str) -> Result<(), SendError>;

    /// Short name used in log fields.
    fn name(&self) -> &'static str;
}
