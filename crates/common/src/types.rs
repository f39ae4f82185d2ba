use serde::{Deserialize, Serialize};

/// Fallback sender when the `From` header is missing.
pub const UNKNOWN_SENDER: &str = "(Unknown sender)";

/// Fallback subject when the `Subject` header is missing.
pub const NO_SUBJECT: &str = "(No subject)";

/// The parts of an inbox message needed to build a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
}

impl EmailSummary {
    /// Human-readable notification text with a direct link to the message.
    pub fn notification_text(&self, link_base: &str) -> String {
        format!(
            "You have a new email from {} with subject: {}. View it here: {}{}",
            self.from, self.subject, link_base, self.id
        )
    }
}

/// Carrier line type reported by a phone number lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Mobile,
    Landline,
    Voip,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for LineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineType::Mobile => write!(f, "mobile"),
            LineType::Landline => write!(f, "landline"),
            LineType::Voip => write!(f, "voip"),
            LineType::Other => write!(f, "other"),
        }
    }
}

/// Point-in-time view of the delivery queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Messages waiting in the buffer, including one currently being attempted
    pub pending: usize,
    /// Whether a drain task is running
    pub draining: bool,
    /// Delay the drain task will use for its next pacing or backoff sleep
    pub current_delay_ms: u64,
    /// Messages delivered successfully
    pub sent: u64,
    /// Messages dropped after a terminal failure or shutdown
    pub dropped: u64,
    /// Rate-limited attempts (each one is retried)
    pub rate_limited: u64,
}
