//! Fire-and-forget telemetry sink backed by a tokio runtime.
//!
//! Each summary is sent on a spawned task so the caller never waits. A failed
//! send is retried with exponential backoff per [`RetryPolicy`]. After
//! [`MAX_CONSECUTIVE_FAILURES`] failed sends in a row the sink goes offline
//! and stops sending until [`OFFLINE_BACKOFF`] has passed, then lets one send
//! through as a trial send. A single success brings it back online.
//!
//! With a [`SummaryBackup`] attached, every summary is backed up before it is
//! sent and removed once delivered. Whatever is left over (failed sends,
//! summaries that arrived while offline, sends cut short by process exit) is
//! replayed after the next successful delivery.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use gsatprep_core::telemetry::{SessionSummary, TelemetrySink};

use crate::backup::SummaryBackup;
use crate::transport::SummaryTransport;

/// Failed sends in a row before the sink goes offline.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// How long an offline sink waits before probing again.
pub const OFFLINE_BACKOFF: Duration = Duration::from_secs(30);

/// How often and how patiently a single summary is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Send attempts per summary, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Send once and never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry`, counting from 1.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Default)]
struct Health {
    consecutive_failures: u32,
    offline_since: Option<Instant>,
}

impl Health {
    /// Whether a send may go out now. Claims the trial slot when offline.
    fn admit(&mut self, now: Instant) -> bool {
        match self.offline_since {
            None => true,
            Some(since) if now.duration_since(since) >= OFFLINE_BACKOFF => {
                self.offline_since = Some(now);
                true
            }
            Some(_) => false,
        }
    }

    fn is_online(&self) -> bool {
        self.offline_since.is_none()
    }

    fn record_success(&mut self) {
        if self.offline_since.is_some() {
            tracing::info!("analytics endpoint reachable again");
        }
        self.consecutive_failures = 0;
        self.offline_since = None;
    }

    fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            if self.offline_since.is_none() {
                tracing::warn!(
                    failures = self.consecutive_failures,
                    "analytics endpoint unavailable, switching to offline mode"
                );
            }
            self.offline_since = Some(now);
        }
    }
}

/// State shared between the sink and its send tasks.
struct Delivery<T> {
    transport: Arc<T>,
    health: Arc<Mutex<Health>>,
    backup: Option<Arc<SummaryBackup>>,
    // Session ids some task is currently sending.
    claimed: Arc<Mutex<HashSet<String>>>,
    retry: RetryPolicy,
}

impl<T> Clone for Delivery<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            health: Arc::clone(&self.health),
            backup: self.backup.clone(),
            claimed: Arc::clone(&self.claimed),
            retry: self.retry,
        }
    }
}

impl<T: SummaryTransport + 'static> Delivery<T> {
    async fn deliver(self, summary: SessionSummary) {
        if !self.claim(&summary.session_id) {
            return;
        }
        let delivered = self.send_with_retry(&summary).await;
        self.release(&summary.session_id);

        if delivered {
            self.replay_backlog().await;
        }
    }

    async fn send_with_retry(&self, summary: &SessionSummary) -> bool {
        for attempt in 1..=self.retry.max_attempts.max(1) {
            if attempt > 1 {
                if !lock(&self.health).is_online() {
                    tracing::debug!(session = %summary.session_id, "offline, leaving summary for replay");
                    return false;
                }
                tokio::time::sleep(self.retry.delay(attempt - 1)).await;
            }
            if self.send_once(summary).await {
                return true;
            }
        }
        false
    }

    async fn send_once(&self, summary: &SessionSummary) -> bool {
        let result = self.transport.send(summary).await;
        match result {
            Ok(()) => {
                lock(&self.health).record_success();
                if let Some(backup) = &self.backup {
                    let _ = backup.remove(&summary.session_id);
                }
                true
            }
            Err(e) => {
                tracing::debug!(
                    transport = self.transport.name(),
                    session = %summary.session_id,
                    "telemetry send failed: {e}"
                );
                lock(&self.health).record_failure(Instant::now());
                if let Some(backup) = &self.backup {
                    let _ = backup.record_attempt(&summary.session_id);
                }
                false
            }
        }
    }

    /// Send backed-up summaries oldest first, stopping at the first failure.
    async fn replay_backlog(&self) {
        let Some(backup) = &self.backup else {
            return;
        };
        backup.clean_old();

        for entry in backup.pending() {
            let id = entry.summary.session_id.clone();
            if !self.claim(&id) {
                continue;
            }
            let delivered = self.send_once(&entry.summary).await;
            self.release(&id);
            if !delivered {
                break;
            }
            tracing::debug!(session = %id, attempts = entry.attempts, "replayed backed-up summary");
        }
    }

    fn claim(&self, session_id: &str) -> bool {
        lock(&self.claimed).insert(session_id.to_string())
    }

    fn release(&self, session_id: &str) {
        lock(&self.claimed).remove(session_id);
    }
}

/// A [`TelemetrySink`] that delivers through `T` on a tokio runtime.
pub struct BackgroundSink<T> {
    delivery: Delivery<T>,
    handle: Handle,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: SummaryTransport + 'static> BackgroundSink<T> {
    /// Create a sink that spawns sends onto `handle`.
    pub fn new(transport: T, handle: Handle) -> Self {
        Self {
            delivery: Delivery {
                transport: Arc::new(transport),
                health: Arc::new(Mutex::new(Health::default())),
                backup: None,
                claimed: Arc::new(Mutex::new(HashSet::new())),
                retry: RetryPolicy::default(),
            },
            handle,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Keep undelivered summaries in `backup` and replay them later.
    pub fn with_backup(mut self, backup: SummaryBackup) -> Self {
        self.delivery.backup = Some(Arc::new(backup));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.delivery.retry = retry;
        self
    }

    pub fn transport(&self) -> &T {
        &self.delivery.transport
    }

    pub fn backup(&self) -> Option<&SummaryBackup> {
        self.delivery.backup.as_deref()
    }

    /// `false` while the sink is in offline mode.
    pub fn is_healthy(&self) -> bool {
        lock(&self.delivery.health).is_online()
    }

    pub fn consecutive_failures(&self) -> u32 {
        lock(&self.delivery.health).consecutive_failures
    }

    /// Try to deliver whatever is in the backup, in the background.
    pub fn replay_backlog(&self) {
        if self.delivery.backup.is_none() || !lock(&self.delivery.health).admit(Instant::now()) {
            return;
        }
        let delivery = self.delivery.clone();
        self.spawn(async move { delivery.replay_backlog().await });
    }

    /// Wait up to `timeout` for in-flight sends. Returns `true` if all finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let pending = std::mem::take(&mut *lock(&self.in_flight));
        if pending.is_empty() {
            return true;
        }

        let count = pending.len();
        let all = async {
            for task in pending {
                let _ = task.await;
            }
        };
        let finished = tokio::time::timeout(timeout, all).await.is_ok();
        if !finished {
            tracing::debug!(count, "gave up waiting for telemetry sends");
        }
        finished
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let task = self.handle.spawn(task);
        let mut in_flight = lock(&self.in_flight);
        in_flight.retain(|t| !t.is_finished());
        in_flight.push(task);
    }
}

impl<T: SummaryTransport + 'static> TelemetrySink for BackgroundSink<T> {
    fn name(&self) -> &str {
        self.delivery.transport.name()
    }

    fn record_session(&self, summary: &SessionSummary) {
        if let Some(backup) = &self.delivery.backup {
            let _ = backup.push(summary);
        }

        if !lock(&self.delivery.health).admit(Instant::now()) {
            if self.delivery.backup.is_some() {
                tracing::debug!(session = %summary.session_id, "telemetry offline, summary kept for replay");
            } else {
                tracing::debug!(session = %summary.session_id, "telemetry offline, dropping summary");
            }
            return;
        }

        let delivery = self.delivery.clone();
        let summary = summary.clone();
        self.spawn(async move { delivery.deliver(summary).await });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::transport::tests::summary;
    use gsatprep_core::store::MemoryStore;
    use gsatprep_core::traits::ManualClock;

    const DRAIN: Duration = Duration::from_secs(1);
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn single_shot(transport: MockTransport) -> BackgroundSink<MockTransport> {
        BackgroundSink::new(transport, Handle::current()).with_retry(RetryPolicy::none())
    }

    fn summary_for(session_id: &str) -> SessionSummary {
        SessionSummary {
            session_id: session_id.into(),
            ..summary()
        }
    }

    fn delivered_ids(sink: &BackgroundSink<MockTransport>) -> Vec<String> {
        sink.transport()
            .delivered()
            .into_iter()
            .map(|s| s.session_id)
            .collect()
    }

    #[test]
    fn retry_delays_double_up_to_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(5));
        assert_eq!(policy.delay(2), Duration::from_secs(10));
        assert_eq!(policy.delay(3), Duration::from_secs(20));
        assert_eq!(policy.delay(4), Duration::from_secs(30));
        assert_eq!(policy.delay(40), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn delivers_in_background() {
        let sink = single_shot(MockTransport::new());
        sink.record_session(&summary());
        sink.record_session(&summary_for("session-2"));
        assert!(sink.drain(DRAIN).await);

        assert_eq!(sink.transport().delivered().len(), 2);
        assert!(sink.is_healthy());
        assert_eq!(sink.name(), "mock");
    }

    #[tokio::test]
    async fn drain_with_nothing_pending() {
        let sink = single_shot(MockTransport::new());
        assert!(sink.drain(DRAIN).await);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_exponential_backoff() {
        let transport = MockTransport::new();
        transport.fail_next(2);
        let sink = BackgroundSink::new(transport, Handle::current());

        let started = Instant::now();
        sink.record_session(&summary());
        assert!(sink.drain(Duration::from_secs(60)).await);

        assert_eq!(sink.transport().call_count(), 3);
        assert_eq!(sink.transport().delivered().len(), 1);
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(sink.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn goes_offline_after_three_failures_and_recovers() {
        let sink = single_shot(MockTransport::failing());

        for _ in 0..MAX_CONSECUTIVE_FAILURES {
            assert!(sink.is_healthy());
            sink.record_session(&summary());
            assert!(sink.drain(DRAIN).await);
        }
        assert!(!sink.is_healthy());
        assert_eq!(sink.transport().call_count(), 3);

        // Offline: summaries are dropped without touching the transport.
        sink.record_session(&summary());
        assert!(sink.drain(DRAIN).await);
        assert_eq!(sink.transport().call_count(), 3);

        // After the back-off a trial send goes out and a success restores the sink.
        tokio::time::advance(OFFLINE_BACKOFF).await;
        sink.transport().set_failing(false);
        sink.record_session(&summary());
        assert!(sink.drain(DRAIN).await);
        assert_eq!(sink.transport().call_count(), 4);
        assert!(sink.is_healthy());
        assert_eq!(sink.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_send_restarts_backoff() {
        let sink = single_shot(MockTransport::failing());
        for _ in 0..MAX_CONSECUTIVE_FAILURES {
            sink.record_session(&summary());
            assert!(sink.drain(DRAIN).await);
        }

        tokio::time::advance(OFFLINE_BACKOFF).await;
        sink.record_session(&summary());
        assert!(sink.drain(DRAIN).await);
        assert_eq!(sink.transport().call_count(), 4);
        assert!(!sink.is_healthy());

        tokio::time::advance(Duration::from_secs(5)).await;
        sink.record_session(&summary());
        assert!(sink.drain(DRAIN).await);
        assert_eq!(sink.transport().call_count(), 4);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let sink = single_shot(MockTransport::failing());
        sink.record_session(&summary());
        assert!(sink.drain(DRAIN).await);
        assert_eq!(sink.consecutive_failures(), 1);

        sink.transport().set_failing(false);
        sink.record_session(&summary());
        assert!(sink.drain(DRAIN).await);
        assert_eq!(sink.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn failed_summary_is_backed_up_and_replayed() {
        let clock = Arc::new(ManualClock::new(DAY_MS));
        let backup = SummaryBackup::new(Arc::new(MemoryStore::new()), clock);
        let sink = single_shot(MockTransport::failing()).with_backup(backup);

        sink.record_session(&summary_for("first"));
        assert!(sink.drain(DRAIN).await);
        let pending = sink.backup().unwrap().pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);

        sink.transport().set_failing(false);
        sink.record_session(&summary_for("second"));
        assert!(sink.drain(DRAIN).await);

        assert_eq!(delivered_ids(&sink), vec!["second", "first"]);
        assert!(sink.backup().unwrap().pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_summaries_are_kept_for_replay() {
        let clock = Arc::new(ManualClock::new(DAY_MS));
        let backup = SummaryBackup::new(Arc::new(MemoryStore::new()), clock);
        let sink = single_shot(MockTransport::failing()).with_backup(backup);

        for id in ["a", "b", "c"] {
            sink.record_session(&summary_for(id));
            assert!(sink.drain(DRAIN).await);
        }
        assert!(!sink.is_healthy());

        sink.record_session(&summary_for("d"));
        assert!(sink.drain(DRAIN).await);
        assert_eq!(sink.transport().call_count(), 3);
        assert_eq!(sink.backup().unwrap().pending().len(), 4);

        tokio::time::advance(OFFLINE_BACKOFF).await;
        sink.transport().set_failing(false);
        sink.record_session(&summary_for("e"));
        assert!(sink.drain(DRAIN).await);

        assert_eq!(delivered_ids(&sink), vec!["e", "a", "b", "c", "d"]);
        assert!(sink.backup().unwrap().pending().is_empty());
        assert!(sink.is_healthy());
    }

    #[tokio::test]
    async fn expired_backups_are_not_replayed() {
        let clock = Arc::new(ManualClock::new(DAY_MS));
        let backup = SummaryBackup::new(Arc::new(MemoryStore::new()), clock.clone());
        let _ = backup.push(&summary_for("stale"));
        clock.advance(8 * DAY_MS);

        let sink = single_shot(MockTransport::new()).with_backup(backup);
        sink.record_session(&summary_for("fresh"));
        assert!(sink.drain(DRAIN).await);

        assert_eq!(delivered_ids(&sink), vec!["fresh"]);
        assert!(sink.backup().unwrap().pending().is_empty());
    }

    #[tokio::test]
    async fn replay_backlog_on_demand() {
        let clock = Arc::new(ManualClock::new(DAY_MS));
        let backup = SummaryBackup::new(Arc::new(MemoryStore::new()), clock);
        let _ = backup.push(&summary_for("left-over"));

        let sink = single_shot(MockTransport::new()).with_backup(backup);
        sink.replay_backlog();
        assert!(sink.drain(DRAIN).await);

        assert_eq!(delivered_ids(&sink), vec!["left-over"]);
    }
}
