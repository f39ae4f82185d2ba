use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use relay_notifier::DeliveryQueue;
use relay_notifier::queue::duration_millis;

use crate::source::MessageSource;

/// Default prefix for the per-message link in notifications.
pub const DEFAULT_LINK_BASE: &str = "https://mail.google.com/mail/u/0/#inbox/";

/// What a single poll tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The mailbox is empty.
    Empty,
    /// The newest message is the one already notified about.
    Unchanged,
    /// A notification for this message id was enqueued.
    Enqueued(String),
    /// A mailbox call failed; the watermark was left untouched.
    Failed,
}

/// Inbox poller that watches for a new newest message and enqueues one
/// notification per new message.
///
/// New-message detection is a watermark on the newest message id. The
/// watermark lives in memory, so a restart re-notifies the current newest message.
pub struct InboxPoller<S> {
    source: S,
    queue: DeliveryQueue,
    poll_interval: Duration,
    link_base: String,
    /// Id of the last message a notification was enqueued for.
    last_seen: Option<String>,
}

impl<S: MessageSource> InboxPoller<S> {
    pub fn new(source: S, queue: DeliveryQueue, poll_interval_ms: u64) -> Self {
        Self {
            source,
            queue,
            poll_interval: Duration::from_millis(poll_interval_ms),
            link_base: DEFAULT_LINK_BASE.to_string(),
            last_seen: None,
        }
    }

    /// Override the link prefix used in notification text.
    pub fn with_link_base(mut self, link_base: impl Into<String>) -> Self {
        self.link_base = link_base.into();
        self
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    /// Start the polling loop. The first tick fires one interval after start.
    /// Returns when `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_ms = duration_millis(self.poll_interval),
            "Inbox poller started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Inbox poller stopped");
    }

    /// Check the mailbox once.
    ///
    /// Enqueues at most one notification. The watermark only advances after
    /// the notification was enqueued, so a failed detail fetch is retried on
    /// the next tick.
    pub async fn tick(&mut self) -> TickOutcome {
        let latest = match self.source.latest_message_id().await {
            Ok(Some(id)) => id,
            Ok(None) => return TickOutcome::Empty,
            Err(e) => {
                tracing::warn!(error = %e, "Error checking new emails");
                return TickOutcome::Failed;
            }
        };

        if self.last_seen.as_deref() == Some(latest.as_str()) {
            return TickOutcome::Unchanged;
        }

        let summary = match self.source.message_summary(&latest).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(
                    message_id = %latest,
                    error = %e,
                    "Error fetching email details, will retry next tick"
                );
                return TickOutcome::Failed;
            }
        };

        tracing::info!(
            message_id = %latest,
            from = %summary.from,
            "New email detected"
        );

        self.queue.enqueue(summary.notification_text(&self.link_base));
        self.last_seen = Some(latest.clone());

        TickOutcome::Enqueued(latest)
    }
}
