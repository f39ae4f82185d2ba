use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use relay_common::types::EmailSummary;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mailbox API returned {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid mailbox URL: {0}")]
    InvalidUrl(String),
}

/// A mailbox the poller can watch for new messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Identifier of the most recent message, or `None` for an empty mailbox.
    async fn latest_message_id(&self) -> Result<Option<String>, SourceError>;

    /// Sender and subject of a message.
    async fn message_summary(&self, id: &str) -> Result<EmailSummary, SourceError>;
}

#[async_trait]
impl<T: MessageSource + ?Sized> MessageSource for Arc<T> {
    async fn latest_message_id(&self) -> Result<Option<String>, SourceError> {
        (**self).latest_message_id().await
    }

    async fn message_summary(&self, id: &str) -> Result<EmailSummary, SourceError> {
        (**self).message_summary(id).await
    }
}
