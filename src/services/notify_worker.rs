//! Notification worker - delivers alerts off the polling path
//!
//! The poll loop enqueues rendered notifications via a bounded mpsc channel and
//! moves on. The worker owns the notifier, delivers in FIFO order, and retries
//! failed sends with capped exponential backoff. Delivery failure never reaches
//! the presence tracker: the transition already happened.

use crate::infra::metrics::Metrics;
use crate::io::notifier::{Notification, Notifier};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, warn};

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base: Duration,
    max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration, max: Duration) -> Self {
        Self { max_retries, base, max }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry` (0-based): base * 2^retry, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Handle used by the poll loop to hand notifications to the worker
#[derive(Clone)]
pub struct NotifySender {
    tx: mpsc::Sender<Notification>,
    metrics: Arc<Metrics>,
}

impl NotifySender {
    /// Enqueue without waiting. Returns false if the notification was dropped.
    pub fn enqueue(&self, notification: Notification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(n)) => {
                self.metrics.record_notification_dropped();
                warn!(event = %n.event, subject = %n.subject, "notification_queue_full");
                false
            }
            Err(TrySendError::Closed(n)) => {
                self.metrics.record_notification_dropped();
                error!(event = %n.event, subject = %n.subject, "notification_worker_gone");
                false
            }
        }
    }
}

/// Worker that delivers notifications sequentially
pub struct NotifyWorker {
    notifier: Arc<dyn Notifier>,
    rx: mpsc::Receiver<Notification>,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl NotifyWorker {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        rx: mpsc::Receiver<Notification>,
        policy: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { notifier, rx, policy, metrics }
    }

    /// Run until every sender is dropped and the queue is drained
    pub async fn run(mut self) {
        info!(notifier = %self.notifier.kind(), max_retries = %self.policy.max_retries, "notify_worker_started");

        while let Some(notification) = self.rx.recv().await {
            self.deliver(&notification).await;
        }

        info!("notify_worker_stopped");
    }

    /// Deliver one notification, retrying per policy. Returns true on success.
    pub async fn deliver(&self, notification: &Notification) -> bool {
        let start = Instant::now();
        let mut retry = 0u32;

        loop {
            match self.notifier.send(notification).await {
                Ok(()) => {
                    self.metrics.record_notification_sent();
                    info!(
                        event = %notification.event,
                        subject = %notification.subject,
                        attempts = %(retry + 1),
                        elapsed_ms = %start.elapsed().as_millis(),
                        "notification_delivered"
                    );
                    return true;
                }
                Err(e) if retry < self.policy.max_retries => {
                    let delay = self.policy.backoff(retry);
                    warn!(
                        event = %notification.event,
                        error = %e,
                        attempt = %(retry + 1),
                        retry_in_ms = %delay.as_millis(),
                        "notification_send_failed"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => {
                    self.metrics.record_notification_failed();
                    error!(
                        event = %notification.event,
                        subject = %notification.subject,
                        error = %e,
                        attempts = %(retry + 1),
                        "notification_gave_up"
                    );
                    return false;
                }
            }
        }
    }
}

/// Create a notification channel and worker
///
/// Returns the sender (for the poll loop) and the worker (to be spawned)
pub fn create_notify_worker(
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (NotifySender, NotifyWorker) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let worker = NotifyWorker::new(notifier, rx, policy, metrics.clone());
    (NotifySender { tx, metrics }, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Transition, TransitionEvent};
    use crate::io::notifier::NotifyError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use time::UtcOffset;

    /// Fails the first `failures` sends, then records successes
    struct FlakyNotifier {
        failures: Mutex<u32>,
        delivered: Mutex<Vec<String>>,
    }

    impl FlakyNotifier {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self { failures: Mutex::new(failures), delivered: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            {
                let mut failures = self.failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(NotifyError::Transport("connection reset".to_string()));
                }
            }
            self.delivered.lock().push(notification.subject.clone());
            Ok(())
        }

        fn kind(&self) -> &'static str {
            "flaky"
        }
    }

    fn notification(event: TransitionEvent) -> Notification {
        let transition = Transition { event, distance_m: 10.0, timestamp_ms: 1 };
        Notification::for_transition(&transition, "Phone", UtcOffset::UTC)
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(4))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(16));
        assert_eq!(policy.backoff(5), Duration::from_secs(30));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
        assert_eq!(RetryPolicy::none().max_retries(), 0);
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let notifier = FlakyNotifier::new(2);
        let metrics = Arc::new(Metrics::new());
        let (_tx, worker) = create_notify_worker(notifier.clone(), fast_policy(3), metrics.clone(), 4);

        assert!(worker.deliver(&notification(TransitionEvent::LeftHome)).await);
        assert_eq!(*notifier.delivered.lock(), vec!["Left Home".to_string()]);
        assert_eq!(metrics.notifications_sent(), 1);
        assert_eq!(metrics.notifications_failed(), 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let notifier = FlakyNotifier::new(10);
        let metrics = Arc::new(Metrics::new());
        let (_tx, worker) = create_notify_worker(notifier.clone(), fast_policy(2), metrics.clone(), 4);

        assert!(!worker.deliver(&notification(TransitionEvent::BackHome)).await);
        // One initial attempt plus two retries
        assert_eq!(*notifier.failures.lock(), 7);
        assert!(notifier.delivered.lock().is_empty());
        assert_eq!(metrics.notifications_failed(), 1);
    }

    #[tokio::test]
    async fn test_worker_drains_in_order() {
        let notifier = FlakyNotifier::new(0);
        let metrics = Arc::new(Metrics::new());
        let (tx, worker) = create_notify_worker(notifier.clone(), fast_policy(0), metrics.clone(), 4);

        assert!(tx.enqueue(notification(TransitionEvent::InitialHome)));
        assert!(tx.enqueue(notification(TransitionEvent::LeftHome)));
        assert!(tx.enqueue(notification(TransitionEvent::BackHome)));
        drop(tx);

        worker.run().await;
        assert_eq!(*notifier.delivered.lock(), vec!["At Home", "Left Home", "Back Home"]);
        assert_eq!(metrics.notifications_sent(), 3);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let notifier = FlakyNotifier::new(0);
        let metrics = Arc::new(Metrics::new());
        let (tx, _worker) = create_notify_worker(notifier, fast_policy(0), metrics.clone(), 1);

        assert!(tx.enqueue(notification(TransitionEvent::InitialHome)));
        assert!(!tx.enqueue(notification(TransitionEvent::LeftHome)));
        assert_eq!(metrics.notifications_dropped(), 1);
    }
}
