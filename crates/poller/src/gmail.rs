//! Gmail REST API message source.
//!
//! Uses the stored OAuth access token as a bearer token. Only the two calls
//! the poller needs are implemented: list the newest messages, and fetch the
//! headers of one message.

use async_trait::async_trait;
use serde::Deserialize;

use relay_common::types::{EmailSummary, NO_SUBJECT, UNKNOWN_SENDER};

use crate::source::{MessageSource, SourceError};

/// How many ids to request when listing; only the first one is used.
const LIST_PAGE_SIZE: &str = "10";

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    id: String,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct MessagePart {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

/// Reads the authenticated user's Gmail inbox.
pub struct GmailSource {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl GmailSource {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// `{base}/gmail/v1/users/me/messages` followed by `extra`, each pushed as an encoded segment.
    fn messages_url(&self, extra: &[&str]) -> Result<reqwest::Url, SourceError> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| SourceError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(self.api_base.clone()))?
            .pop_if_empty()
            .extend(["gmail", "v1", "users", "me", "messages"])
            .extend(extra);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: reqwest::Url,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MessageSource for GmailSource {
    async fn latest_message_id(&self) -> Result<Option<String>, SourceError> {
        let list: MessageList = self
            .get_json(self.messages_url(&[])?, &[("maxResults", LIST_PAGE_SIZE)])
            .await?;
        Ok(list.messages.into_iter().next().map(|m| m.id))
    }

    async fn message_summary(&self, id: &str) -> Result<EmailSummary, SourceError> {
        let url = self.messages_url(&[id])?;
        let message: Message = self.get_json(url, &[("format", "full")]).await?;
        Ok(summarize(message))
    }
}

/// Pull `From` and `Subject` out of a full-format message.
pub(crate) fn summarize(message: Message) -> EmailSummary {
    let headers = message.payload.map(|p| p.headers).unwrap_or_default();
    let header = |name: &str| {
        headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.clone())
    };

    EmailSummary {
        from: header("From").unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
        subject: header("Subject").unwrap_or_else(|| NO_SUBJECT.to_string()),
        id: message.id,
    }
}
