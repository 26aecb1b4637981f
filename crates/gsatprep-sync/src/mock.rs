//! Mock transport for testing.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use gsatprep_core::telemetry::SessionSummary;

use crate::error::SyncError;
use crate::transport::SummaryTransport;

/// A transport that records what it is given instead of sending it.
///
/// Can be switched into a failing mode to exercise offline handling.
#[derive(Default)]
pub struct MockTransport {
    failing: AtomicBool,
    fail_next: AtomicU32,
    call_count: AtomicU32,
    delivered: Mutex<Vec<SessionSummary>>,
}

impl MockTransport {
    /// Create a mock that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that fails every send.
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_failing(true);
        mock
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Fail the next `count` sends, then behave as before.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::Relaxed);
    }

    /// Number of send attempts, successful or not.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Summaries that were accepted.
    pub fn delivered(&self) -> Vec<SessionSummary> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SummaryTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, summary: &SessionSummary) -> Result<(), SyncError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let forced = self
            .fail_next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if forced || self.failing.load(Ordering::Relaxed) {
            return Err(SyncError::NetworkError("mock transport is offline".into()));
        }

        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(summary.clone());
        }
        Ok(())
    }
}
