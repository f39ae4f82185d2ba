use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Twilio account SID (basic auth user for Messages and Lookup APIs)
    pub twilio_account_sid: String,

    /// Twilio auth token
    pub twilio_auth_token: String,

    /// WhatsApp sender, e.g. `whatsapp:+14155238886`
    pub twilio_whatsapp_number: String,

    /// WhatsApp recipient for new-mail notifications
    pub user_whatsapp_number: String,

    /// Base URL of the Twilio REST API
    pub twilio_api_url: String,

    /// Base URL of the Twilio Lookup API
    pub twilio_lookup_url: String,

    /// Path to the Google OAuth client credentials file
    pub gmail_credentials_path: String,

    /// Path to the stored Google OAuth token
    pub gmail_token_path: String,

    /// Base URL of the Gmail REST API
    pub gmail_api_url: String,

    /// Prefix for the per-message link included in notifications
    pub mail_link_base: String,

    /// Inbox polling interval in milliseconds (default: 6000)
    pub poll_interval_ms: u64,

    /// Minimum gap between sends and the initial backoff, in milliseconds (default: 1000)
    pub queue_base_delay_ms: u64,

    /// Upper bound for the backoff delay. Unset means the delay keeps doubling.
    pub queue_max_delay_ms: Option<u64>,

    /// Port the HTTP API listens on (default: 3000)
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            twilio_account_sid: required("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: required("TWILIO_AUTH_TOKEN")?,
            twilio_whatsapp_number: required("TWILIO_WHATSAPP_NUMBER")?,
            user_whatsapp_number: required("USER_WHATSAPP_NUMBER")?,
            twilio_api_url: std::env::var("TWILIO_API_URL")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
            twilio_lookup_url: std::env::var("TWILIO_LOOKUP_URL")
                .unwrap_or_else(|_| "https://lookups.twilio.com".to_string()),
            gmail_credentials_path: std::env::var("GMAIL_CREDENTIALS_PATH")
                .unwrap_or_else(|_| "credentials.json".to_string()),
            gmail_token_path: std::env::var("GMAIL_TOKEN_PATH")
                .unwrap_or_else(|_| "token.json".to_string()),
            gmail_api_url: std::env::var("GMAIL_API_URL")
                .unwrap_or_else(|_| "https://gmail.googleapis.com".to_string()),
            mail_link_base: std::env::var("MAIL_LINK_BASE")
                .unwrap_or_else(|_| "https://mail.google.com/mail/u/0/#inbox/".to_string()),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "6000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("POLL_INTERVAL_MS must be a valid u64"))?,
            queue_base_delay_ms: std::env::var("QUEUE_BASE_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("QUEUE_BASE_DELAY_MS must be a valid u64"))?,
            queue_max_delay_ms: std::env::var("QUEUE_MAX_DELAY_MS")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .map_err(|_| anyhow::anyhow!("QUEUE_MAX_DELAY_MS must be a valid u64"))?,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("{key} environment variable is required"))
}
