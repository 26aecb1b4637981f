//! Fire-and-forget reporting of completed sessions.
//!
//! The scoring and progress paths never wait on a sink and never see its
//! errors. The default sink does nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Band, ExamYear, Section};
use crate::scoring::{ScoringResult, SectionScore};

/// Summary of one completed session, as sent to remote analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub exam_year: ExamYear,
    pub session_id: String,
    pub total_points_earned: u32,
    pub total_points_possible: u32,
    pub percentage: f64,
    pub band: Band,
    pub sections: BTreeMap<Section, SectionScore>,
    pub answered_questions: usize,
    pub total_questions: usize,
    pub bookmarked_questions: usize,
    /// Wall-clock time from session start to submission.
    pub time_spent_ms: i64,
    /// Submission time, epoch milliseconds.
    pub completed_at: i64,
}

impl SessionSummary {
    pub fn from_result(
        exam_year: ExamYear,
        session_id: String,
        result: &ScoringResult,
        bookmarked_questions: usize,
        start_time: i64,
        completed_at: i64,
    ) -> Self {
        Self {
            exam_year,
            session_id,
            total_points_earned: result.total_points_earned,
            total_points_possible: result.total_points_possible,
            percentage: result.percentage,
            band: result.band,
            sections: result.sections.clone(),
            answered_questions: result.answered_count(),
            total_questions: result.questions.len(),
            bookmarked_questions,
            time_spent_ms: completed_at.saturating_sub(start_time).max(0),
            completed_at,
        }
    }
}

/// Receiver of completed-session summaries.
///
/// Implementations must return promptly and swallow their own failures.
pub trait TelemetrySink: Send + Sync {
    /// Human-readable sink name (e.g. "http").
    fn name(&self) -> &str;

    /// Hand off a summary. Must not block on I/O.
    fn record_session(&self, summary: &SessionSummary);
}

/// Sink that discards everything.
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    fn record_session(&self, _: &SessionSummary) {}
}
