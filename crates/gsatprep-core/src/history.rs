//! Local history of completed exam attempts.
//!
//! Stored as one JSON blob in the same key-value store as progress
//! snapshots, keeping the most recent attempts per exam year.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{ExamYear, Section};
use crate::progress::WriteOutcome;
use crate::scoring::SectionScore;
use crate::telemetry::SessionSummary;
use crate::traits::KeyValueStore;

/// Storage key of the history blob.
pub const HISTORY_KEY: &str = "gsat_exam_results";

/// Attempts kept per exam year.
pub const MAX_RECORDS_PER_YEAR: usize = 10;

/// One completed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRecord {
    pub exam_year: ExamYear,
    pub session_id: String,
    /// Completion time, epoch milliseconds.
    pub completed_at: i64,
    pub points_earned: u32,
    pub points_possible: u32,
    pub percentage: f64,
    pub time_spent_ms: i64,
    #[serde(default)]
    pub sections: BTreeMap<Section, SectionScore>,
    #[serde(default)]
    pub answered_questions: usize,
    #[serde(default)]
    pub bookmarked_questions: usize,
}

impl From<&SessionSummary> for ExamRecord {
    fn from(summary: &SessionSummary) -> Self {
        Self {
            exam_year: summary.exam_year.clone(),
            session_id: summary.session_id.clone(),
            completed_at: summary.completed_at,
            points_earned: summary.total_points_earned,
            points_possible: summary.total_points_possible,
            percentage: summary.percentage,
            time_spent_ms: summary.time_spent_ms,
            sections: summary.sections.clone(),
            answered_questions: summary.answered_questions,
            bookmarked_questions: summary.bookmarked_questions,
        }
    }
}

type Records = BTreeMap<ExamYear, Vec<ExamRecord>>;

/// Reads and appends completed attempts.
#[derive(Clone)]
pub struct ResultHistory {
    backend: Arc<dyn KeyValueStore>,
}

impl ResultHistory {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Append an attempt, dropping the oldest ones past the per-year limit.
    pub fn record(&self, record: ExamRecord) -> WriteOutcome {
        let mut all = self.load_all();
        let year_records = all.entry(record.exam_year.clone()).or_default();
        year_records.push(record);
        year_records.sort_by_key(|r| r.completed_at);
        if year_records.len() > MAX_RECORDS_PER_YEAR {
            let excess = year_records.len() - MAX_RECORDS_PER_YEAR;
            year_records.drain(..excess);
        }

        let json = match serde_json::to_string(&all) {
            Ok(json) => json,
            Err(e) => {
                let err = StoreError::Serialize("exam history", e);
                tracing::warn!("{err}");
                return WriteOutcome::Failed(err);
            }
        };
        match self.backend.set(HISTORY_KEY, &json) {
            Ok(()) => WriteOutcome::Written,
            Err(e) => {
                tracing::warn!("failed to save exam history: {e}");
                WriteOutcome::Failed(e)
            }
        }
    }

    /// Attempts for one year, oldest first.
    pub fn records(&self, year: &ExamYear) -> Vec<ExamRecord> {
        self.load_all().remove(year).unwrap_or_default()
    }

    /// Every attempt across all years, oldest first.
    pub fn all_records(&self) -> Vec<ExamRecord> {
        let mut all: Vec<ExamRecord> = self.load_all().into_values().flatten().collect();
        all.sort_by_key(|r| r.completed_at);
        all
    }

    /// Attempts grouped by year.
    pub fn by_year(&self) -> BTreeMap<ExamYear, Vec<ExamRecord>> {
        self.load_all()
    }

    fn load_all(&self) -> Records {
        let raw = match self.backend.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Records::new(),
            Err(e) => {
                tracing::warn!("failed to read exam history: {e}");
                return Records::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("discarding unreadable exam history: {e}");
            Records::new()
        })
    }
}
