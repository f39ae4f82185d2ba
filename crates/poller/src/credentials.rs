//! Loading of the Google OAuth client credentials and stored user token.
//!
//! Obtaining or refreshing tokens is not handled here. When the token file is
//! missing, the consent URL is logged so an operator can produce one.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Read-only Gmail scope requested in the consent URL.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("credentials file has no redirect URIs")]
    NoRedirectUri,

    #[error("cannot build consent URL: {0}")]
    ConsentUrl(String),

    #[error("token file {0} not found; authorize the app and store the token first")]
    TokenMissing(PathBuf),
}

/// `credentials.json` as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientCredentials {
    pub web: WebClient,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebClient {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// `token.json` written after the user granted access.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    /// Expiry as milliseconds since the Unix epoch
    pub expiry_date: Option<i64>,
}

impl StoredToken {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry_date.and_then(DateTime::from_timestamp_millis)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }
}

impl ClientCredentials {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        read_json(path.as_ref())
    }

    /// URL the user visits to grant offline read-only access to their mailbox.
    pub fn consent_url(&self) -> Result<String, CredentialsError> {
        let redirect_uri = self
            .web
            .redirect_uris
            .first()
            .ok_or(CredentialsError::NoRedirectUri)?;

        let url = reqwest::Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("access_type", "offline"),
                ("scope", GMAIL_READONLY_SCOPE),
                ("response_type", "code"),
                ("client_id", self.web.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ],
        )
        .map_err(|e| CredentialsError::ConsentUrl(e.to_string()))?;

        Ok(url.to_string())
    }
}

/// Load the client credentials and the stored token.
///
/// A missing token file is reported with the consent URL logged at warn level.
pub fn authorize(
    credentials_path: impl AsRef<Path>,
    token_path: impl AsRef<Path>,
) -> Result<(ClientCredentials, StoredToken), CredentialsError> {
    let credentials = ClientCredentials::load(credentials_path)?;
    let token_path = token_path.as_ref();

    if !token_path.exists() {
        match credentials.consent_url() {
            Ok(url) => tracing::warn!(url = %url, "Authorize this app by visiting this url"),
            Err(e) => tracing::warn!(error = %e, "Cannot build consent URL"),
        }
        return Err(CredentialsError::TokenMissing(token_path.to_path_buf()));
    }

    let token: StoredToken = read_json(token_path)?;

    if token.is_expired(Utc::now()) {
        tracing::warn!(
            expired_at = ?token.expires_at(),
            has_refresh_token = token.refresh_token.is_some(),
            "Stored Gmail access token has expired; mailbox requests will fail until it is replaced"
        );
    }

    Ok((credentials, token))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CredentialsError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CredentialsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
