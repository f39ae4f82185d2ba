//! Behavioural tests for the delivery queue.
//!
//! All tests run on a paused Tokio clock, so backoff and pacing sleeps complete
//! instantly while `tokio::time::Instant` still reports the simulated time.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use relay_notifier::{DeliveryQueue, Notifier, QueueConfig, SendError};

// ============================================================
// Helpers
// ============================================================

#[derive(Debug, Clone, Copy)]
enum Outcome {
    RateLimited,
    Other,
    Panic,
}

/// Notifier that records every call and fails according to a per-message script.
/// Messages without a scripted outcome succeed.
#[derive(Default)]
struct ScriptedNotifier {
    calls: Mutex<Vec<String>>,
    script: Mutex<HashMap<String, VecDeque<Outcome>>>,
    send_time: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_send_time(send_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            send_time,
            ..Self::default()
        })
    }

    fn script(&self, message: &str, outcomes: &[Outcome]) {
        self.script
            .lock()
            .unwrap()
            .insert(message.to_string(), outcomes.iter().copied().collect());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    async fn send(&self, message: &str) -> Result<(), SendError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.send_time.is_zero() {
            tokio::time::sleep(self.send_time).await;
        }

        self.calls.lock().unwrap().push(message.to_string());
        let outcome = self
            .script
            .lock()
            .unwrap()
            .get_mut(message)
            .and_then(|outcomes| outcomes.pop_front());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            None => Ok(()),
            Some(Outcome::RateLimited) => Err(SendError::RateLimited("429".to_string())),
            Some(Outcome::Other) => Err(SendError::Other("invalid recipient".to_string())),
            Some(Outcome::Panic) => panic!("transport exploded"),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn queue_for(notifier: &Arc<ScriptedNotifier>) -> DeliveryQueue {
    DeliveryQueue::new(notifier.clone(), QueueConfig::default())
}

// ============================================================
// Ordering and delivery
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_messages_sent_in_fifo_order() {
    let notifier = ScriptedNotifier::new();
    let queue = queue_for(&notifier);

    queue.enqueue("A");
    queue.enqueue("B");
    queue.idle().await;

    assert_eq!(notifier.calls(), vec!["A", "B"]);

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.pending, 0);
    assert!(!snapshot.draining);
    assert_eq!(snapshot.sent, 2);
    assert_eq!(snapshot.dropped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_identical_messages_are_not_deduplicated() {
    let notifier = ScriptedNotifier::new();
    let queue = queue_for(&notifier);

    queue.enqueue("same");
    queue.enqueue("same");
    queue.idle().await;

    assert_eq!(notifier.calls(), vec!["same", "same"]);
    assert_eq!(queue.snapshot().sent, 2);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_after_idle_starts_new_drain() {
    let notifier = ScriptedNotifier::new();
    let queue = queue_for(&notifier);

    queue.enqueue("A");
    queue.idle().await;
    assert!(!queue.snapshot().draining);

    queue.enqueue("B");
    assert!(queue.snapshot().draining);
    queue.idle().await;

    assert_eq!(notifier.calls(), vec!["A", "B"]);
}

#[tokio::test(start_paused = true)]
async fn test_pacing_gap_between_successful_sends() {
    let notifier = ScriptedNotifier::new();
    let queue = queue_for(&notifier);
    let start = Instant::now();

    queue.enqueue("A");
    queue.enqueue("B");
    queue.idle().await;

    // One base-delay gap after each attempt
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(2000), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2100), "elapsed {:?}", elapsed);
}

// ============================================================
// Rate limiting and backoff
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_rate_limited_message_retried_before_later_messages() {
    let notifier = ScriptedNotifier::new();
    notifier.script("A", &[Outcome::RateLimited, Outcome::RateLimited]);
    let queue = queue_for(&notifier);

    queue.enqueue("A");

    // B arrives while A is backing off
    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            queue.enqueue("B");
        })
    };
    producer.await.unwrap();
    queue.idle().await;

    assert_eq!(notifier.calls(), vec!["A", "A", "A", "B"]);

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.sent, 2);
    assert_eq!(snapshot.rate_limited, 2);
    assert_eq!(snapshot.dropped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_sleeps_and_pacing_both_apply() {
    let notifier = ScriptedNotifier::new();
    notifier.script("A", &[Outcome::RateLimited, Outcome::RateLimited]);
    let queue = queue_for(&notifier);
    let start = Instant::now();

    queue.enqueue("A");
    queue.idle().await;

    // attempt 1: backoff 1s, pacing 2s
    // attempt 2: backoff 2s, pacing 4s
    // attempt 3: success, pacing 1s
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(10_000), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(10_100), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_delay_doubles_per_rate_limit_and_resets_on_success() {
    let notifier = ScriptedNotifier::new();
    notifier.script(
        "A",
        &[Outcome::RateLimited, Outcome::RateLimited, Outcome::RateLimited],
    );
    let queue = queue_for(&notifier);
    let base = queue.config().base_delay;

    queue.enqueue("A");

    // Attempts at t=0, 3s, 9s; each backoff sleep ends at 1s, 5s, 13s.
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(queue.snapshot().rate_limited, 1);
    assert_eq!(queue.current_delay(), base * 2);

    tokio::time::sleep(Duration::from_millis(13_000)).await;
    assert_eq!(queue.snapshot().rate_limited, 3);
    assert_eq!(queue.current_delay(), base * 8);

    queue.idle().await;
    assert_eq!(notifier.calls().len(), 4);
    assert_eq!(queue.current_delay(), base);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_capped_by_max_delay() {
    let notifier = ScriptedNotifier::new();
    notifier.script(
        "A",
        &[Outcome::RateLimited, Outcome::RateLimited, Outcome::RateLimited],
    );
    let queue = DeliveryQueue::new(notifier.clone(), QueueConfig::from_millis(1000, Some(1500)));

    queue.enqueue("A");

    // Attempts at t=0, 2.5s, 5.5s; third backoff ends at 7s.
    tokio::time::sleep(Duration::from_millis(7500)).await;
    assert_eq!(queue.snapshot().rate_limited, 3);
    assert_eq!(queue.current_delay(), Duration::from_millis(1500));

    queue.idle().await;
    assert_eq!(notifier.calls(), vec!["A", "A", "A", "A"]);
}

// ============================================================
// Terminal failures
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_other_failure_is_not_retried() {
    let notifier = ScriptedNotifier::new();
    notifier.script("A", &[Outcome::Other]);
    let queue = queue_for(&notifier);

    queue.enqueue("A");
    queue.enqueue("B");
    queue.idle().await;

    assert_eq!(notifier.calls(), vec!["A", "B"]);

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.sent, 1);
    assert_eq!(snapshot.dropped, 1);
    assert_eq!(snapshot.rate_limited, 0);
}

#[tokio::test(start_paused = true)]
async fn test_other_failure_keeps_current_delay() {
    let notifier = ScriptedNotifier::new();
    notifier.script("A", &[Outcome::RateLimited, Outcome::Other]);
    let queue = queue_for(&notifier);

    queue.enqueue("A");

    // Rate limited at t=0 (delay -> 2s), dropped at t=3s, pacing until 5s.
    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert_eq!(queue.snapshot().dropped, 1);
    assert_eq!(queue.current_delay(), Duration::from_millis(2000));

    queue.idle().await;
    assert_eq!(notifier.calls(), vec!["A", "A"]);
    assert_eq!(queue.current_delay(), Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_new_drain_starts_at_base_delay() {
    let notifier = ScriptedNotifier::new();
    notifier.script("A", &[Outcome::RateLimited, Outcome::Other]);
    notifier.script("B", &[Outcome::RateLimited]);
    let queue = queue_for(&notifier);

    // First drain ends with the doubled delay left behind
    queue.enqueue("A");
    queue.idle().await;
    assert_eq!(queue.current_delay(), Duration::from_millis(2000));

    let start = Instant::now();
    queue.enqueue("B");
    assert_eq!(queue.current_delay(), Duration::from_millis(1000));
    queue.idle().await;

    // 1s backoff + 2s pacing, then success and 1s pacing
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(4000), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(4100), "elapsed {:?}", elapsed);
    assert_eq!(notifier.calls(), vec!["A", "A", "B", "B"]);

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.sent, 1);
    assert_eq!(snapshot.dropped, 1);
    assert_eq!(snapshot.rate_limited, 2);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_notifier_treated_as_terminal_failure() {
    let notifier = ScriptedNotifier::new();
    notifier.script("A", &[Outcome::Panic]);
    let queue = queue_for(&notifier);

    queue.enqueue("A");
    queue.enqueue("B");
    queue.idle().await;

    assert_eq!(notifier.calls(), vec!["A", "B"]);
    let snapshot = queue.snapshot();
    assert_eq!(snapshot.dropped, 1);
    assert_eq!(snapshot.sent, 1);
    assert!(!snapshot.draining);
}

// ============================================================
// Concurrency
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_single_drain_under_concurrent_enqueue() {
    let notifier = ScriptedNotifier::with_send_time(Duration::from_millis(50));
    notifier.script("p0-m1", &[Outcome::RateLimited]);
    let queue = queue_for(&notifier);

    let producers: Vec<_> = (0..8)
        .map(|p| {
            let queue = queue.clone();
            tokio::spawn(async move {
                for m in 0..5 {
                    queue.enqueue(format!("p{}-m{}", p, m));
                    tokio::time::sleep(Duration::from_millis(300 * (p + 1))).await;
                }
            })
        })
        .collect();

    for producer in producers {
        producer.await.unwrap();
    }
    queue.idle().await;

    assert_eq!(notifier.max_in_flight.load(Ordering::SeqCst), 1);

    let calls = notifier.calls();
    assert_eq!(calls.len(), 41);

    // Every message attempted once, except the rate-limited one which is retried back to back
    let mut unique = calls.clone();
    unique.dedup();
    assert_eq!(unique.len(), 40);
    let mut sorted = unique.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 40);

    // Per-producer order is preserved
    for p in 0..8 {
        let prefix = format!("p{}-", p);
        let own: Vec<_> = unique.iter().filter(|c| c.starts_with(&prefix)).collect();
        let expected: Vec<_> = (0..5).map(|m| format!("p{}-m{}", p, m)).collect();
        assert_eq!(own, expected.iter().collect::<Vec<_>>());
    }

    assert_eq!(queue.snapshot().sent, 40);
}

// ============================================================
// Shutdown
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_drops_buffered_messages() {
    let notifier = ScriptedNotifier::new();
    notifier.script("A", &[Outcome::RateLimited; 10]);
    let queue = queue_for(&notifier);

    queue.enqueue("A");
    queue.enqueue("B");
    tokio::time::sleep(Duration::from_millis(500)).await;

    queue.shutdown().await;

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.pending, 0);
    assert!(!snapshot.draining);
    assert_eq!(snapshot.dropped, 2);

    queue.enqueue("C");
    tokio::time::sleep(Duration::from_millis(5000)).await;

    assert_eq!(notifier.calls(), vec!["A"]);
    assert_eq!(queue.snapshot().pending, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_when_idle_returns_immediately() {
    let notifier = ScriptedNotifier::new();
    let queue = queue_for(&notifier);

    queue.shutdown().await;

    assert!(!queue.snapshot().draining);
    assert!(notifier.calls().is_empty());
}
