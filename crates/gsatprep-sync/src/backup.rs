//! Local backup of session summaries that have not reached the endpoint.
//!
//! A summary is written here before the first send and removed once the
//! endpoint accepts it, so a failed send or an early process exit leaves it
//! behind for a later replay. Entries older than [`BACKUP_MAX_AGE`] are
//! discarded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gsatprep_core::error::StoreError;
use gsatprep_core::progress::WriteOutcome;
use gsatprep_core::telemetry::SessionSummary;
use gsatprep_core::traits::{Clock, KeyValueStore};

/// Storage key of the backup blob.
pub const BACKUP_KEY: &str = "gsat_telemetry_backup";

/// How long an undelivered summary is kept.
pub const BACKUP_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One undelivered summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    /// When the summary was first backed up, epoch milliseconds.
    pub saved_at: i64,
    /// Failed send attempts so far.
    pub attempts: u32,
    pub summary: SessionSummary,
}

/// Undelivered summaries, persisted in a [`KeyValueStore`].
pub struct SummaryBackup {
    backend: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write cycles from concurrent send tasks.
    guard: Mutex<()>,
}

impl SummaryBackup {
    pub fn new(backend: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            guard: Mutex::new(()),
        }
    }

    /// Back up `summary`. A summary with the same session id is replaced,
    /// keeping its original `saved_at` and attempt count.
    pub fn push(&self, summary: &SessionSummary) -> WriteOutcome {
        let now = self.clock.now_ms();
        self.modify(|entries| {
            match entries
                .iter_mut()
                .find(|e| e.summary.session_id == summary.session_id)
            {
                Some(existing) => existing.summary = summary.clone(),
                None => entries.push(BackupEntry {
                    saved_at: now,
                    attempts: 0,
                    summary: summary.clone(),
                }),
            }
        })
    }

    /// Count one more failed attempt for `session_id`.
    pub fn record_attempt(&self, session_id: &str) -> WriteOutcome {
        self.modify(|entries| {
            if let Some(entry) = entries.iter_mut().find(|e| e.summary.session_id == session_id) {
                entry.attempts = entry.attempts.saturating_add(1);
            }
        })
    }

    /// Drop the entry for a delivered summary.
    pub fn remove(&self, session_id: &str) -> WriteOutcome {
        self.modify(|entries| entries.retain(|e| e.summary.session_id != session_id))
    }

    /// Entries still within [`BACKUP_MAX_AGE`], oldest first.
    pub fn pending(&self) -> Vec<BackupEntry> {
        let cutoff = self.cutoff();
        let _guard = lock(&self.guard);
        let mut entries: Vec<BackupEntry> = self
            .load()
            .into_iter()
            .filter(|e| e.saved_at >= cutoff)
            .collect();
        entries.sort_by_key(|e| e.saved_at);
        entries
    }

    /// Discard entries older than [`BACKUP_MAX_AGE`]. Returns how many went.
    pub fn clean_old(&self) -> usize {
        let cutoff = self.cutoff();
        let mut removed = 0;
        let outcome = self.modify(|entries| {
            let before = entries.len();
            entries.retain(|e| e.saved_at >= cutoff);
            removed = before - entries.len();
        });
        if removed > 0 && outcome.is_written() {
            tracing::info!(removed, "discarded expired telemetry backups");
        }
        removed
    }

    fn cutoff(&self) -> i64 {
        let max_age_ms = i64::try_from(BACKUP_MAX_AGE.as_millis()).unwrap_or(i64::MAX);
        self.clock.now_ms().saturating_sub(max_age_ms)
    }

    fn modify(&self, change: impl FnOnce(&mut Vec<BackupEntry>)) -> WriteOutcome {
        let _guard = lock(&self.guard);
        let mut entries = self.load();
        change(&mut entries);

        let result = if entries.is_empty() {
            self.backend.remove(BACKUP_KEY)
        } else {
            match serde_json::to_string(&entries) {
                Ok(json) => self.backend.set(BACKUP_KEY, &json),
                Err(e) => Err(StoreError::Serialize("telemetry backup", e)),
            }
        };
        match result {
            Ok(()) => WriteOutcome::Written,
            Err(e) => {
                tracing::warn!("failed to update telemetry backup: {e}");
                WriteOutcome::Failed(e)
            }
        }
    }

    fn load(&self) -> Vec<BackupEntry> {
        let raw = match self.backend.get(BACKUP_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("failed to read telemetry backup: {e}");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("discarding unreadable telemetry backup: {e}");
            Vec::new()
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
