//! Phone number verification via the Twilio Lookup API.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use relay_common::types::LineType;

use crate::twilio::TwilioCredentials;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("lookup rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("invalid lookup URL: {0}")]
    InvalidUrl(String),
}

/// Resolves the carrier line type of a phone number.
#[async_trait]
pub trait PhoneVerifier: Send + Sync {
    /// `Ok(None)` means the number exists but no carrier information came back.
    async fn line_type(&self, phone_number: &str) -> Result<Option<LineType>, LookupError>;
}

#[derive(Debug, Deserialize)]
struct PhoneNumberResource {
    carrier: Option<Carrier>,
}

#[derive(Debug, Deserialize)]
struct Carrier {
    #[serde(rename = "type")]
    line_type: Option<LineType>,
}

/// Twilio Lookup v1 client requesting carrier information.
pub struct TwilioLookup {
    http: reqwest::Client,
    lookup_base: String,
    credentials: TwilioCredentials,
}

impl TwilioLookup {
    pub fn new(
        http: reqwest::Client,
        lookup_base: impl Into<String>,
        credentials: TwilioCredentials,
    ) -> Self {
        Self {
            http,
            lookup_base: lookup_base.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// `{base}/v1/PhoneNumbers/{number}`, with the number encoded as a single path segment.
    fn phone_number_url(&self, phone_number: &str) -> Result<reqwest::Url, LookupError> {
        let mut url = reqwest::Url::parse(&self.lookup_base)
            .map_err(|e| LookupError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| LookupError::InvalidUrl(self.lookup_base.clone()))?
            .pop_if_empty()
            .extend(["v1", "PhoneNumbers", phone_number]);
        Ok(url)
    }
}

#[async_trait]
impl PhoneVerifier for TwilioLookup {
    async fn line_type(&self, phone_number: &str) -> Result<Option<LineType>, LookupError> {
        let url = self.phone_number_url(phone_number)?;

        let response = self
            .http
            .get(url)
            .basic_auth(
                &self.credentials.account_sid,
                Some(&self.credentials.auth_token),
            )
            .query(&[("Type", "carrier")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LookupError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let resource: PhoneNumberResource = response.json().await?;
        Ok(parse_line_type(resource))
    }
}

fn parse_line_type(resource: PhoneNumberResource) -> Option<LineType> {
    resource.carrier.and_then(|carrier| carrier.line_type)
}
