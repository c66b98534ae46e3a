//! In-memory mail delivery queue
//!
//! Senders enqueue and move on; a single worker task drains jobs strictly in
//! queue order, retrying each job through the same retry executor the
//! clients use before dropping it. The worker is lazy: it is spawned by the
//! first enqueue into an empty queue and exits once the queue is drained, so
//! an idle process carries no background task. Nothing is persisted; jobs
//! die with the process.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use subsarr_common::resilience::{RetryConfig, RetryError, RetryExecutor};

use super::errors::OutboundError;
use super::mailer::OutboundMessage;

/// Something that can deliver a queued message.
///
/// `MailerClient` is the production implementation; tests supply fakes.
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), OutboundError>;
}

/// Scheduling class for queued jobs.
///
/// High-priority jobs are inserted ahead of pending normal jobs but never
/// ahead of other high-priority jobs; within a class the order is strictly
/// first-in, first-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliveryPriority {
    High,
    Normal,
}

/// One queued delivery.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub id: Uuid,
    pub message: OutboundMessage,
    pub priority: DeliveryPriority,
    pub attempts_allowed: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Default attempt budget for jobs enqueued without one of their own.
    pub max_attempts: u32,
    /// First retry delay for a failed job; doubles per retry.
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_attempts: 3, retry_delay: Duration::from_secs(5) }
    }
}

/// Monotonic queue counters plus the current backlog size.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub pending: usize,
}

struct QueueState {
    jobs: VecDeque<DeliveryJob>,
    worker_running: bool,
}

struct QueueShared {
    handler: Arc<dyn DeliveryHandler>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    shutdown: CancellationToken,
}

/// Handle to the delivery queue. Clones share one queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    shared: Arc<QueueShared>,
}

impl DeliveryQueue {
    pub fn new(handler: Arc<dyn DeliveryHandler>, config: QueueConfig) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                handler,
                config,
                state: Mutex::new(QueueState { jobs: VecDeque::new(), worker_running: false }),
                enqueued: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Queue a message with the default attempt budget.
    pub fn enqueue(&self, message: OutboundMessage, priority: DeliveryPriority) -> Uuid {
        self.enqueue_with_attempts(message, priority, self.shared.config.max_attempts)
    }

    /// Queue a message for delivery and return the job id.
    ///
    /// Never blocks on the actual send; spawns the worker if none is running.
    /// The job carries its own attempt budget, honored by the worker.
    pub fn enqueue_with_attempts(
        &self,
        message: OutboundMessage,
        priority: DeliveryPriority,
        max_attempts: u32,
    ) -> Uuid {
        let job = DeliveryJob {
            id: Uuid::new_v4(),
            message,
            priority,
            attempts_allowed: max_attempts.max(1),
            enqueued_at: Utc::now(),
        };
        let id = job.id;

        let spawn_worker = {
            let mut state = self.shared.state.lock();
            match priority {
                DeliveryPriority::Normal => state.jobs.push_back(job),
                DeliveryPriority::High => {
                    // Behind existing high-priority jobs, ahead of normal ones.
                    let position = state
                        .jobs
                        .iter()
                        .position(|queued| queued.priority == DeliveryPriority::Normal)
                        .unwrap_or(state.jobs.len());
                    state.jobs.insert(position, job);
                }
            }
            if state.worker_running {
                false
            } else {
                state.worker_running = true;
                true
            }
        };
        self.shared.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(job_id = %id, ?priority, "queued delivery");

        if spawn_worker {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                Self::drain(shared).await;
            });
        }
        id
    }

    /// Number of jobs waiting (not counting one being processed).
    pub fn len(&self) -> usize {
        self.shared.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.shared.enqueued.load(Ordering::Relaxed),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            pending: self.len(),
        }
    }

    /// Stop the worker; pending jobs are abandoned.
    pub fn close(&self) {
        self.shared.shutdown.cancel();
    }

    /// Wait until the backlog is drained and the worker has exited.
    pub async fn flush(&self) {
        loop {
            {
                let state = self.shared.state.lock();
                if state.jobs.is_empty() && !state.worker_running {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn drain(shared: Arc<QueueShared>) {
        loop {
            if shared.shutdown.is_cancelled() {
                shared.state.lock().worker_running = false;
                return;
            }
            let job = {
                let mut state = shared.state.lock();
                match state.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        state.worker_running = false;
                        return;
                    }
                }
            };
            Self::process(&shared, job).await;
        }
    }

    async fn process(shared: &QueueShared, job: DeliveryJob) {
        let retry = RetryExecutor::new(RetryConfig {
            max_attempts: job.attempts_allowed,
            base_delay: shared.config.retry_delay,
        });
        let delivery = retry.run_with_report(|| shared.handler.deliver(&job.message));
        tokio::select! {
            () = shared.shutdown.cancelled() => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                warn!(job_id = %job.id, "delivery abandoned at shutdown");
            }
            result = delivery => match result {
                Ok(report) => {
                    shared.delivered.fetch_add(1, Ordering::Relaxed);
                    info!(job_id = %job.id, attempts = report.attempts, "delivery succeeded");
                }
                Err(err) => {
                    // Best effort: the job is dropped, not requeued.
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                    let (attempts, cause) = match err {
                        RetryError::Exhausted { attempts, source }
                        | RetryError::Aborted { attempts, source, .. } => (attempts, source),
                    };
                    let dropped =
                        OutboundError::QueueJobExhausted { job_id: job.id, attempts };
                    warn!(
                        code = dropped.error_code(),
                        cause_code = cause.error_code(),
                        cause = %cause,
                        "{dropped}"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Semaphore;

    use crate::outbound::TransportError;

    use super::*;

    fn message(to: &str) -> OutboundMessage {
        OutboundMessage {
            to: to.to_string(),
            subject: "subject".to_string(),
            body: "body".to_string(),
        }
    }

    fn quick_config(max_attempts: u32) -> QueueConfig {
        QueueConfig { max_attempts, retry_delay: Duration::from_millis(1) }
    }

    /// Records delivery order; fails the first `failures_per_job` attempts
    /// for recipients listed in `flaky`.
    struct FakeHandler {
        order: Mutex<Vec<String>>,
        flaky: Vec<String>,
        failures_per_job: u32,
        attempts_seen: Mutex<std::collections::HashMap<String, u32>>,
        always_fail: bool,
    }

    impl FakeHandler {
        fn new() -> Self {
            Self {
                order: Mutex::new(Vec::new()),
                flaky: Vec::new(),
                failures_per_job: 0,
                attempts_seen: Mutex::new(std::collections::HashMap::new()),
                always_fail: false,
            }
        }
    }

    #[async_trait]
    impl DeliveryHandler for FakeHandler {
        async fn deliver(&self, message: &OutboundMessage) -> Result<(), OutboundError> {
            let attempt = {
                let mut seen = self.attempts_seen.lock();
                let counter = seen.entry(message.to.clone()).or_insert(0);
                *counter += 1;
                *counter
            };
            if self.always_fail
                || (self.flaky.contains(&message.to) && attempt <= self.failures_per_job)
            {
                return Err(OutboundError::Transport(TransportError::Timeout));
            }
            self.order.lock().push(message.to.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn drains_in_enqueue_order() {
        let handler = Arc::new(FakeHandler::new());
        let queue = DeliveryQueue::new(handler.clone(), quick_config(1));

        queue.enqueue(message("a@example.com"), DeliveryPriority::Normal);
        queue.enqueue(message("b@example.com"), DeliveryPriority::Normal);
        queue.enqueue(message("c@example.com"), DeliveryPriority::Normal);
        queue.flush().await;

        assert_eq!(
            *handler.order.lock(),
            vec!["a@example.com", "b@example.com", "c@example.com"]
        );
        let stats = queue.stats();
        assert_eq!(stats.enqueued, 3);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn flaky_job_is_retried_until_it_succeeds() {
        let handler = Arc::new(FakeHandler {
            flaky: vec!["a@example.com".to_string()],
            failures_per_job: 2,
            ..FakeHandler::new()
        });
        let queue = DeliveryQueue::new(handler.clone(), quick_config(3));

        queue.enqueue(message("a@example.com"), DeliveryPriority::Normal);
        queue.flush().await;

        assert_eq!(*handler.attempts_seen.lock().get("a@example.com").unwrap(), 3);
        assert_eq!(queue.stats().delivered, 1);
    }

    #[tokio::test]
    async fn exhausted_job_is_dropped_and_later_jobs_still_run() {
        let handler = Arc::new(FakeHandler {
            flaky: vec!["dead@example.com".to_string()],
            failures_per_job: u32::MAX,
            ..FakeHandler::new()
        });
        let queue = DeliveryQueue::new(handler.clone(), quick_config(2));

        queue.enqueue(message("dead@example.com"), DeliveryPriority::Normal);
        queue.enqueue(message("live@example.com"), DeliveryPriority::Normal);
        queue.flush().await;

        assert_eq!(*handler.order.lock(), vec!["live@example.com"]);
        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn each_job_spends_its_own_attempt_budget() {
        let handler = Arc::new(FakeHandler { always_fail: true, ..FakeHandler::new() });
        let queue = DeliveryQueue::new(handler.clone(), quick_config(5));

        queue.enqueue_with_attempts(message("once@x.com"), DeliveryPriority::Normal, 1);
        queue.enqueue_with_attempts(message("thrice@x.com"), DeliveryPriority::Normal, 3);
        queue.flush().await;

        let seen = handler.attempts_seen.lock();
        assert_eq!(*seen.get("once@x.com").unwrap(), 1);
        assert_eq!(*seen.get("thrice@x.com").unwrap(), 3);
        drop(seen);
        assert_eq!(queue.stats().failed, 2);
    }

    #[tokio::test]
    async fn every_job_exhausting_leaves_an_empty_queue() {
        let handler = Arc::new(FakeHandler { always_fail: true, ..FakeHandler::new() });
        let queue = DeliveryQueue::new(handler.clone(), quick_config(2));

        for name in ["a@x.com", "b@x.com", "c@x.com"] {
            queue.enqueue(message(name), DeliveryPriority::Normal);
        }
        queue.flush().await;

        let stats = queue.stats();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.delivered, 0);
        assert!(queue.is_empty());
        for name in ["a@x.com", "b@x.com", "c@x.com"] {
            assert_eq!(*handler.attempts_seen.lock().get(name).unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn high_priority_jumps_ahead_of_pending_normal_jobs() {
        /// Blocks each delivery until a permit is released by the test.
        struct GatedHandler {
            order: Mutex<Vec<String>>,
            gate: Semaphore,
        }

        #[async_trait]
        impl DeliveryHandler for GatedHandler {
            async fn deliver(&self, message: &OutboundMessage) -> Result<(), OutboundError> {
                // Permit is intentionally leaked; each delivery consumes one.
                self.gate.acquire().await.map_err(|_| {
                    OutboundError::Transport(TransportError::Other {
                        message: "gate closed".to_string(),
                    })
                })?.forget();
                self.order.lock().push(message.to.clone());
                Ok(())
            }
        }

        let handler =
            Arc::new(GatedHandler { order: Mutex::new(Vec::new()), gate: Semaphore::new(0) });
        let queue = DeliveryQueue::new(handler.clone(), quick_config(1));

        // First job starts processing and blocks on the gate; the rest pile up.
        queue.enqueue(message("first@x.com"), DeliveryPriority::Normal);
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(message("normal@x.com"), DeliveryPriority::Normal);
        queue.enqueue(message("urgent@x.com"), DeliveryPriority::High);
        tokio::time::sleep(Duration::from_millis(10)).await;

        handler.gate.add_permits(3);
        queue.flush().await;

        assert_eq!(*handler.order.lock(), vec!["first@x.com", "urgent@x.com", "normal@x.com"]);
    }

    #[tokio::test]
    async fn worker_respawns_for_a_second_batch() {
        let handler = Arc::new(FakeHandler::new());
        let queue = DeliveryQueue::new(handler.clone(), quick_config(1));

        queue.enqueue(message("one@x.com"), DeliveryPriority::Normal);
        queue.flush().await;
        assert!(!queue.shared.state.lock().worker_running);

        queue.enqueue(message("two@x.com"), DeliveryPriority::Normal);
        queue.flush().await;
        assert_eq!(*handler.order.lock(), vec!["one@x.com", "two@x.com"]);
    }

    #[tokio::test]
    async fn close_stops_the_worker() {
        let handler = Arc::new(FakeHandler {
            flaky: vec!["slow@x.com".to_string()],
            failures_per_job: u32::MAX,
            ..FakeHandler::new()
        });
        let queue = DeliveryQueue::new(
            handler.clone(),
            QueueConfig { max_attempts: 100, retry_delay: Duration::from_secs(60) },
        );

        queue.enqueue(message("slow@x.com"), DeliveryPriority::Normal);
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.close();
        queue.flush().await;
        // The in-flight job was abandoned during its backoff.
        assert_eq!(queue.stats().failed, 1);
    }
}
