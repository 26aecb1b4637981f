//! Progress snapshots and their persistence.
//!
//! Every answer change writes the whole [`ProgressSnapshot`] under a key
//! namespaced by exam year. There is no diffing and no reconciliation: the
//! only rule is that a snapshot older than the persisted one never replaces
//! it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{AnswerValue, ExamYear, QuestionId};
use crate::traits::KeyValueStore;

/// Full persisted state of one exam-taking session.
///
/// Field names are part of the on-disk format and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub exam_year: ExamYear,
    pub session_id: String,
    #[serde(default)]
    pub answers: BTreeMap<QuestionId, AnswerValue>,
    #[serde(default)]
    pub bookmarks: BTreeSet<QuestionId>,
    /// Session start, epoch milliseconds.
    pub start_time: i64,
    /// Last write, epoch milliseconds.
    pub last_saved: i64,
    /// First time each question was touched, epoch milliseconds.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub question_times: BTreeMap<QuestionId, i64>,
}

impl ProgressSnapshot {
    pub fn new(exam_year: ExamYear, session_id: impl Into<String>, start_time: i64) -> Self {
        Self {
            exam_year,
            session_id: session_id.into(),
            answers: BTreeMap::new(),
            bookmarks: BTreeSet::new(),
            start_time,
            last_saved: start_time,
            question_times: BTreeMap::new(),
        }
    }
}

/// What happened to a write.
#[derive(Debug)]
#[must_use]
pub enum WriteOutcome {
    /// The store now holds the new state.
    Written,
    /// A newer snapshot was already persisted, so nothing was written.
    Stale { persisted_last_saved: i64 },
    /// The store rejected the operation. In-memory state is unaffected.
    Failed(StoreError),
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written)
    }

    /// The storage failure to surface as a non-blocking notification, if any.
    pub fn warning(&self) -> Option<&StoreError> {
        match self {
            WriteOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Storage key for a year's in-progress snapshot.
pub fn progress_key(year: &ExamYear) -> String {
    format!("gsat_exam_{year}_progress")
}

/// Persists and restores [`ProgressSnapshot`]s.
#[derive(Clone)]
pub struct ProgressStore {
    backend: Arc<dyn KeyValueStore>,
}

impl ProgressStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Persist the full snapshot, unless a newer one is already stored.
    pub fn save(&self, snapshot: &ProgressSnapshot) -> WriteOutcome {
        let key = progress_key(&snapshot.exam_year);

        match self.backend.get(&key) {
            Ok(Some(raw)) => {
                // An unreadable blob is treated as absent and simply overwritten.
                if let Ok(persisted) = serde_json::from_str::<ProgressSnapshot>(&raw) {
                    if persisted.last_saved > snapshot.last_saved {
                        tracing::warn!(
                            year = %snapshot.exam_year,
                            persisted = persisted.last_saved,
                            incoming = snapshot.last_saved,
                            "rejecting stale progress save"
                        );
                        return WriteOutcome::Stale {
                            persisted_last_saved: persisted.last_saved,
                        };
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(year = %snapshot.exam_year, "could not read persisted progress: {e}");
            }
        }

        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(e) => {
                let err = StoreError::Serialize("progress snapshot", e);
                tracing::warn!(year = %snapshot.exam_year, "{err}");
                return WriteOutcome::Failed(err);
            }
        };

        match self.backend.set(&key, &json) {
            Ok(()) => WriteOutcome::Written,
            Err(e) => {
                tracing::warn!(year = %snapshot.exam_year, "failed to save progress: {e}");
                WriteOutcome::Failed(e)
            }
        }
    }

    /// Restore the snapshot for `year`.
    ///
    /// Missing, unreadable, corrupt, or mismatched-year data all yield `None`.
    pub fn load(&self, year: &ExamYear) -> Option<ProgressSnapshot> {
        let raw = match self.backend.get(&progress_key(year)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%year, "failed to read progress: {e}");
                return None;
            }
        };

        let snapshot: ProgressSnapshot = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(%year, "discarding unreadable progress snapshot: {e}");
                return None;
            }
        };

        if &snapshot.exam_year != year {
            tracing::warn!(
                %year,
                found = %snapshot.exam_year,
                "discarding progress snapshot for another year"
            );
            return None;
        }

        Some(snapshot)
    }

    /// Remove the snapshot for `year`. Clearing an absent snapshot is a no-op.
    pub fn clear(&self, year: &ExamYear) -> WriteOutcome {
        match self.backend.remove(&progress_key(year)) {
            Ok(()) => WriteOutcome::Written,
            Err(e) => {
                tracing::warn!(%year, "failed to clear progress: {e}");
                WriteOutcome::Failed(e)
            }
        }
    }
}
