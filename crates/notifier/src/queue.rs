//! Delivery queue: paced, rate-limit aware hand-off to a [`Notifier`].
//!
//! Producers call [`DeliveryQueue::enqueue`], which appends to an in-memory
//! FIFO buffer and, if nothing is draining it, spawns a drain task. The drain
//! task attempts one message at a time:
//!
//! - success: the message is removed and the delay resets to the base delay
//! - rate limited: the message stays at the head, the task sleeps for the
//!   current delay and then doubles it
//! - any other failure: the message is dropped and logged
//!
//! After every attempt the task sleeps for the current delay again, so the
//! provider never sees two sends closer together than the base delay.
//!
//! The draining flag is checked and set under the same lock as the buffer
//! push, and cleared under the same lock that observes the buffer empty, so a
//! message can never be left behind by a drain that is just finishing.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use relay_common::types::QueueSnapshot;

use crate::notifier::{Notifier, SendError};

/// Default pacing gap and initial backoff (1 second).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Timing configuration for a [`DeliveryQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Gap between consecutive attempts, and the first backoff step.
    pub base_delay: Duration,
    /// Cap for the doubled delay. `None` lets it grow without bound.
    pub max_delay: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: None,
        }
    }
}

impl QueueConfig {
    pub fn from_millis(base_delay_ms: u64, max_delay_ms: Option<u64>) -> Self {
        Self {
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: max_delay_ms.map(Duration::from_millis),
        }
    }

    /// Delay to use after another rate-limited attempt.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let doubled = delay.saturating_mul(2);
        match self.max_delay {
            Some(max) => doubled.min(max),
            None => doubled,
        }
    }
}

#[derive(Debug)]
struct QueueState {
    buffer: VecDeque<String>,
    draining: bool,
    current_delay: Duration,
    sent: u64,
    dropped: u64,
    rate_limited: u64,
}

struct Inner {
    notifier: Arc<dyn Notifier>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    idle: Notify,
    shutdown: CancellationToken,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        // Nothing panics while holding the lock, but don't wedge the queue if it ever does.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sleep for `delay`, returning early on shutdown.
    async fn pause(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }
}

/// Cloneable handle to a delivery queue bound to one notifier.
///
/// Must be used from within a Tokio runtime: the first enqueue after the queue
/// went idle spawns the drain task.
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<Inner>,
}

impl DeliveryQueue {
    pub fn new(notifier: Arc<dyn Notifier>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                notifier,
                config,
                state: Mutex::new(QueueState {
                    buffer: VecDeque::new(),
                    draining: false,
                    current_delay: config.base_delay,
                    sent: 0,
                    dropped: 0,
                    rate_limited: 0,
                }),
                idle: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Append a message to the tail of the queue and make sure a drain task is running.
    ///
    /// Never blocks on delivery and never fails. Identical messages are not
    /// deduplicated. After [`shutdown`](Self::shutdown) messages are discarded.
    pub fn enqueue(&self, message: impl Into<String>) {
        let message = message.into();

        if self.inner.shutdown.is_cancelled() {
            tracing::warn!(
                notifier = self.inner.notifier.name(),
                "Delivery queue is shut down, discarding message"
            );
            return;
        }

        let (start_drain, pending) = {
            let mut state = self.inner.state();
            state.buffer.push_back(message);
            let start_drain = !state.draining;
            if start_drain {
                // Backoff never carries over from a previous drain.
                state.current_delay = self.inner.config.base_delay;
            }
            state.draining = true;
            (start_drain, state.buffer.len())
        };

        tracing::debug!(pending, start_drain, "Message enqueued");

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
    }

    /// Current buffer length, drain status, delay and counters.
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state();
        QueueSnapshot {
            pending: state.buffer.len(),
            draining: state.draining,
            current_delay_ms: duration_millis(state.current_delay),
            sent: state.sent,
            dropped: state.dropped,
            rate_limited: state.rate_limited,
        }
    }

    /// The delay the drain task will use for its next sleep.
    pub fn current_delay(&self) -> Duration {
        self.inner.state().current_delay
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.config
    }

    /// Wait until no drain task is running.
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let draining = self.inner.state().draining;
            if !draining {
                return;
            }
            notified.await;
        }
    }

    /// Stop draining. The in-flight attempt finishes, sleeps are cut short, and
    /// whatever is still buffered is dropped. Resolves once the drain task has exited.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.idle().await;
    }
}

async fn drain(inner: Arc<Inner>) {
    let notifier = inner.notifier.name();
    tracing::debug!(notifier, "Drain started");

    loop {
        let message = {
            let mut state = inner.state();
            let next = if inner.shutdown.is_cancelled() {
                None
            } else {
                state.buffer.front().cloned()
            };
            match next {
                Some(message) => message,
                None => {
                    let abandoned = state.buffer.len();
                    state.buffer.clear();
                    state.dropped += abandoned as u64;
                    state.draining = false;
                    if abandoned > 0 {
                        tracing::warn!(
                            notifier,
                            abandoned,
                            "Delivery queue shut down with undelivered messages"
                        );
                    }
                    break;
                }
            }
        };

        let outcome = AssertUnwindSafe(inner.notifier.send(&message))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(SendError::Other(panic_message(panic.as_ref()))));

        let delay = match outcome {
            Ok(()) => {
                let mut state = inner.state();
                state.buffer.pop_front();
                state.sent += 1;
                state.current_delay = inner.config.base_delay;
                tracing::debug!(notifier, pending = state.buffer.len(), "Message delivered");
                state.current_delay
            }
            Err(SendError::RateLimited(detail)) => {
                let backoff = {
                    let mut state = inner.state();
                    state.rate_limited += 1;
                    state.current_delay
                };
                tracing::warn!(
                    notifier,
                    detail = %detail,
                    backoff_ms = duration_millis(backoff),
                    "Rate limit exceeded, backing off"
                );

                inner.pause(backoff).await;

                let mut state = inner.state();
                state.current_delay = inner.config.next_delay(backoff);
                state.current_delay
            }
            Err(SendError::Other(detail)) => {
                let mut state = inner.state();
                state.buffer.pop_front();
                state.dropped += 1;
                tracing::error!(notifier, detail = %detail, "Failed to send message, dropping it");
                state.current_delay
            }
        };

        inner.pause(delay).await;
    }

    tracing::debug!(notifier, "Drain finished");
    inner.idle.notify_waiters();
}

/// Milliseconds in `delay`, saturating at `u64::MAX`.
pub fn duration_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("notifier panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("notifier panicked: {msg}")
    } else {
        "notifier panicked".to_string()
    }
}
