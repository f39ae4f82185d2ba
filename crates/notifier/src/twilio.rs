//! WhatsApp delivery over the Twilio Messages API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::notifier::{Notifier, SendError};

/// Twilio error code for "Too Many Requests".
const TWILIO_RATE_LIMIT_CODE: u32 = 20429;

/// Account credentials shared by the Messages and Lookup clients.
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
}

/// Successful `Messages.json` response (only the fields we log).
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    status: Option<String>,
}

/// Twilio REST error body.
#[derive(Debug, Default, Deserialize)]
struct TwilioErrorBody {
    code: Option<u32>,
    message: Option<String>,
}

/// Sends every message from a fixed WhatsApp sender to a fixed recipient.
pub struct TwilioNotifier {
    http: reqwest::Client,
    api_base: String,
    credentials: TwilioCredentials,
    from: String,
    to: String,
}

impl TwilioNotifier {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        credentials: TwilioCredentials,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
            from: from.into(),
            to: to.into(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.credentials.account_sid
        )
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, message: &str) -> Result<(), SendError> {
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(
                &self.credentials.account_sid,
                Some(&self.credentials.auth_token),
            )
            .form(&[
                ("Body", message),
                ("From", self.from.as_str()),
                ("To", self.to.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SendError::Other(format!("Twilio request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            match serde_json::from_str::<MessageResource>(&body) {
                Ok(resource) => tracing::info!(
                    sid = %resource.sid,
                    status = resource.status.as_deref().unwrap_or("unknown"),
                    "Message sent"
                ),
                Err(_) => tracing::info!("Message sent"),
            }
            return Ok(());
        }

        Err(classify_failure(status, &body))
    }

    fn name(&self) -> &'static str {
        "twilio-whatsapp"
    }
}

/// Map a non-2xx Twilio response to a [`SendError`].
///
/// HTTP 429 or Twilio error code 20429 is throttling; anything else is terminal.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> SendError {
    let error: TwilioErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = match (error.code, error.message) {
        (Some(code), Some(message)) => format!("{} (code {}): {}", status, code, message),
        (None, Some(message)) => format!("{}: {}", status, message),
        _ => status.to_string(),
    };

    if status == StatusCode::TOO_MANY_REQUESTS || error.code == Some(TWILIO_RATE_LIMIT_CODE) {
        SendError::RateLimited(detail)
    } else {
        SendError::Other(detail)
    }
}
