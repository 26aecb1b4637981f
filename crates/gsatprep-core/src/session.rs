//! Exam-taking session orchestrator.
//!
//! Ties an [`AnswerKey`] to a [`ProgressStore`], writing the whole snapshot
//! through on every change, and on submission scores the answers, records
//! history and hands a summary to telemetry.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::SessionError;
use crate::history::{ExamRecord, ResultHistory};
use crate::model::{AnswerKey, AnswerValue, QuestionId};
use crate::progress::{ProgressSnapshot, ProgressStore, WriteOutcome};
use crate::scoring::{score_values, ScoringResult};
use crate::statistics::{question_durations, time_distribution, TimeDistribution};
use crate::telemetry::{NoopSink, SessionSummary, TelemetrySink};
use crate::traits::Clock;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing answered yet.
    NotStarted,
    /// At least one answer or bookmark recorded.
    InProgress,
    /// Scored. Terminal.
    Submitted,
}

/// Live progress figures for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub answered: usize,
    pub total: usize,
    /// Answered fraction in `0.0..=1.0`.
    pub completion: f64,
    pub bookmarked: usize,
    pub elapsed: Duration,
    /// Time left before the exam limit, saturating at zero.
    pub remaining: Duration,
    /// Mean seconds since first touch over touched questions.
    pub average_secs_per_question: Option<f64>,
    /// Minutes needed for the unanswered questions at the current pace.
    pub estimated_minutes_remaining: Option<f64>,
}

/// What a submission produced.
#[derive(Debug)]
pub struct Submission {
    pub result: ScoringResult,
    pub summary: SessionSummary,
    /// Outcome of clearing the persisted snapshot.
    pub cleared: WriteOutcome,
    /// Outcome of recording the attempt, when history is enabled.
    pub recorded: Option<WriteOutcome>,
}

/// One learner working through one exam year.
pub struct ExamSession {
    key: Arc<AnswerKey>,
    store: ProgressStore,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
    history: Option<ResultHistory>,
    snapshot: ProgressSnapshot,
    state: SessionState,
}

impl ExamSession {
    /// Open a session, restoring saved progress for the key's year if any.
    pub fn open(key: Arc<AnswerKey>, store: ProgressStore, clock: Arc<dyn Clock>) -> Self {
        let (snapshot, state) = match store.load(key.year()) {
            Some(snapshot) => {
                tracing::debug!(
                    year = %key.year(),
                    session = %snapshot.session_id,
                    answers = snapshot.answers.len(),
                    "restored saved progress"
                );
                (snapshot, SessionState::InProgress)
            }
            None => (
                ProgressSnapshot::new(key.year().clone(), new_session_id(), clock.now_ms()),
                SessionState::NotStarted,
            ),
        };

        Self {
            key,
            store,
            clock,
            telemetry: Arc::new(NoopSink),
            history: None,
            snapshot,
            state,
        }
    }

    /// Send completed-session summaries to `sink`.
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    /// Record completed attempts in `history`.
    pub fn with_history(mut self, history: ResultHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.snapshot.session_id
    }

    pub fn key(&self) -> &AnswerKey {
        &self.key
    }

    /// The in-memory snapshot, which may be ahead of the store after a failed write.
    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Record an answer and save.
    ///
    /// An empty value clears the question.
    pub fn answer(
        &mut self,
        question: QuestionId,
        value: AnswerValue,
    ) -> Result<WriteOutcome, SessionError> {
        self.check_writable(question)?;
        let now = self.touch(question);

        if value.is_empty() {
            self.snapshot.answers.remove(&question);
        } else {
            self.snapshot.answers.insert(question, value);
        }
        Ok(self.persist(now))
    }

    /// Flip the bookmark on `question` and save.
    pub fn toggle_bookmark(&mut self, question: QuestionId) -> Result<WriteOutcome, SessionError> {
        self.check_writable(question)?;
        let now = self.touch(question);

        if !self.snapshot.bookmarks.remove(&question) {
            self.snapshot.bookmarks.insert(question);
        }
        Ok(self.persist(now))
    }

    /// Discard everything and start over with a new session id.
    pub fn reset(&mut self) -> Result<WriteOutcome, SessionError> {
        self.ensure_not_submitted()?;

        let outcome = self.store.clear(self.key.year());
        self.snapshot = ProgressSnapshot::new(
            self.key.year().clone(),
            new_session_id(),
            self.clock.now_ms(),
        );
        self.state = SessionState::NotStarted;
        tracing::info!(year = %self.key.year(), "exam progress reset");
        Ok(outcome)
    }

    /// Score the answers and close the session.
    ///
    /// Telemetry is handed off without waiting; storage problems are
    /// returned in the [`Submission`] rather than failing the call.
    pub fn submit(&mut self) -> Result<Submission, SessionError> {
        self.ensure_not_submitted()?;

        let completed_at = self.clock.now_ms().max(self.snapshot.start_time);
        let result = score_values(&self.key, &self.snapshot.answers);
        let summary = SessionSummary::from_result(
            self.key.year().clone(),
            self.snapshot.session_id.clone(),
            &result,
            self.snapshot.bookmarks.len(),
            self.snapshot.start_time,
            completed_at,
        );

        let cleared = self.store.clear(self.key.year());
        let recorded = self
            .history
            .as_ref()
            .map(|history| history.record(ExamRecord::from(&summary)));
        self.telemetry.record_session(&summary);
        self.state = SessionState::Submitted;

        tracing::info!(
            year = %self.key.year(),
            session = %summary.session_id,
            earned = result.total_points_earned,
            possible = result.total_points_possible,
            band = %result.band,
            "exam submitted"
        );

        Ok(Submission {
            result,
            summary,
            cleared,
            recorded,
        })
    }

    /// Progress figures as of `now` (epoch milliseconds).
    pub fn progress(&self, now: i64) -> ProgressReport {
        let total = self.key.total_questions();
        let answered = self
            .snapshot
            .answers
            .keys()
            .filter(|q| self.key.contains(**q))
            .count();
        let completion = if total == 0 {
            0.0
        } else {
            answered as f64 / total as f64
        };

        let elapsed_ms = now.saturating_sub(self.snapshot.start_time).max(0) as u64;
        let elapsed = Duration::from_millis(elapsed_ms);
        let remaining = self.key.time_limit().saturating_sub(elapsed);

        let times = &self.snapshot.question_times;
        let average_secs_per_question = if times.is_empty() {
            None
        } else {
            let total_ms: f64 = times
                .values()
                .map(|t| now.saturating_sub(*t).max(0) as f64)
                .sum();
            Some(total_ms / times.len() as f64 / 1000.0)
        };
        let estimated_minutes_remaining = match average_secs_per_question {
            Some(avg) if answered > 0 => Some((total - answered) as f64 * avg / 60.0),
            _ => None,
        };

        ProgressReport {
            answered,
            total,
            completion,
            bookmarked: self.snapshot.bookmarks.len(),
            elapsed,
            remaining,
            average_secs_per_question,
            estimated_minutes_remaining,
        }
    }

    /// Spread of time spent per touched question, if any were touched.
    pub fn time_distribution(&self) -> Option<TimeDistribution> {
        let durations = question_durations(self.snapshot.start_time, &self.snapshot.question_times);
        time_distribution(&durations)
    }

    fn ensure_not_submitted(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Submitted {
            return Err(SessionError::AlreadySubmitted(self.key.year().to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, question: QuestionId) -> Result<(), SessionError> {
        self.ensure_not_submitted()?;
        if !self.key.contains(question) {
            return Err(SessionError::UnknownQuestion {
                question,
                year: self.key.year().to_string(),
            });
        }
        Ok(())
    }

    /// Start the clock if needed and note the first touch of `question`.
    fn touch(&mut self, question: QuestionId) -> i64 {
        let now = self.clock.now_ms();
        if self.state == SessionState::NotStarted {
            self.snapshot.start_time = now;
            self.state = SessionState::InProgress;
        }
        self.snapshot.question_times.entry(question).or_insert(now);
        now
    }

    fn persist(&mut self, now: i64) -> WriteOutcome {
        // lastSaved never goes backwards, even if the wall clock does.
        self.snapshot.last_saved = now.max(self.snapshot.last_saved);
        self.store.save(&self.snapshot)
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::StoreError;
    use crate::model::{ExamYear, ExpectedAnswer, KeyEntry, Section};
    use crate::store::MemoryStore;
    use crate::traits::{KeyValueStore, ManualClock};

    fn key() -> Arc<AnswerKey> {
        let entries = vec![
            KeyEntry {
                question: 1,
                expected: ExpectedAnswer::choice("A"),
                section: Section::Vocabulary,
                points: 1,
            },
            KeyEntry {
                question: 2,
                expected: ExpectedAnswer::fill_in("participating", vec![]),
                section: Section::FillIn,
                points: 1,
            },
            KeyEntry {
                question: 3,
                expected: ExpectedAnswer::multi(["C", "D"]),
                section: Section::Mixed,
                points: 2,
            },
        ];
        Arc::new(AnswerKey::new(ExamYear::new("111").unwrap(), 4, entries).unwrap())
    }

    #[derive(Default)]
    struct RecordingSink {
        summaries: Mutex<Vec<SessionSummary>>,
    }

    impl TelemetrySink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn record_session(&self, summary: &SessionSummary) {
            self.summaries.lock().unwrap().push(summary.clone());
        }
    }

    struct Fixture {
        backend: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                backend: Arc::new(MemoryStore::new()),
                clock: Arc::new(ManualClock::new(1_000)),
            }
        }

        fn open(&self) -> ExamSession {
            ExamSession::open(key(), ProgressStore::new(self.backend.clone()), self.clock.clone())
        }
    }

    #[test]
    fn fresh_session_is_not_started() {
        let fx = Fixture::new();
        let session = fx.open();
        assert_eq!(session.state(), SessionState::NotStarted);
        assert!(Uuid::parse_str(session.session_id()).is_ok());
        assert!(fx.backend.is_empty());
    }

    #[test]
    fn answer_writes_through_and_restores() {
        let fx = Fixture::new();
        let mut session = fx.open();
        fx.clock.set(5_000);
        assert!(session.answer(1, AnswerValue::text("A")).unwrap().is_written());
        assert_eq!(session.state(), SessionState::InProgress);
        fx.clock.advance(1_000);
        assert!(session.toggle_bookmark(3).unwrap().is_written());

        let restored = fx.open();
        assert_eq!(restored.state(), SessionState::InProgress);
        assert_eq!(restored.session_id(), session.session_id());
        assert_eq!(restored.snapshot(), session.snapshot());
        assert_eq!(restored.snapshot().start_time, 5_000);
        assert_eq!(restored.snapshot().last_saved, 6_000);
        assert_eq!(restored.snapshot().question_times.get(&1), Some(&5_000));
    }

    #[test]
    fn empty_answer_clears_question() {
        let fx = Fixture::new();
        let mut session = fx.open();
        let _ = session.answer(2, AnswerValue::text("x")).unwrap();
        let _ = session.answer(2, AnswerValue::text("  ")).unwrap();
        assert!(session.snapshot().answers.is_empty());
    }

    #[test]
    fn bookmark_toggles() {
        let fx = Fixture::new();
        let mut session = fx.open();
        let _ = session.toggle_bookmark(2).unwrap();
        assert!(session.snapshot().bookmarks.contains(&2));
        let _ = session.toggle_bookmark(2).unwrap();
        assert!(session.snapshot().bookmarks.is_empty());
    }

    #[test]
    fn unknown_question_is_rejected() {
        let fx = Fixture::new();
        let mut session = fx.open();
        let err = session.answer(99, AnswerValue::text("A")).unwrap_err();
        assert!(matches!(err, SessionError::UnknownQuestion { question: 99, .. }));
        assert!(!err.is_terminal());
        assert_eq!(session.state(), SessionState::NotStarted);
    }

    #[test]
    fn last_saved_is_monotonic() {
        let fx = Fixture::new();
        let mut session = fx.open();
        fx.clock.set(10_000);
        let _ = session.answer(1, AnswerValue::text("A")).unwrap();
        fx.clock.set(4_000);
        assert!(session.answer(1, AnswerValue::text("B")).unwrap().is_written());
        assert_eq!(session.snapshot().last_saved, 10_000);
        assert_eq!(
            fx.open().snapshot().answers.get(&1),
            Some(&AnswerValue::text("B"))
        );
    }

    #[test]
    fn quota_failure_does_not_block_answering() {
        let backend = Arc::new(MemoryStore::with_quota(32));
        let clock = Arc::new(ManualClock::new(0));
        let mut session = ExamSession::open(key(), ProgressStore::new(backend), clock);

        let outcome = session.answer(1, AnswerValue::text("A")).unwrap();
        assert!(matches!(
            outcome.warning(),
            Some(StoreError::QuotaExceeded { .. })
        ));
        let _ = session.answer(3, AnswerValue::set(["C", "D"])).unwrap();
        assert_eq!(session.snapshot().answers.len(), 2);

        let submission = session.submit().unwrap();
        assert_eq!(submission.result.total_points_earned, 3);
    }

    #[test]
    fn submit_scores_records_and_reports() {
        let fx = Fixture::new();
        let sink = Arc::new(RecordingSink::default());
        let history = ResultHistory::new(fx.backend.clone());
        let mut session = fx
            .open()
            .with_telemetry(sink.clone())
            .with_history(history.clone());

        fx.clock.set(2_000);
        let _ = session.answer(1, AnswerValue::text("A")).unwrap();
        let _ = session.answer(2, AnswerValue::text(" Participating ")).unwrap();
        let _ = session.answer(3, AnswerValue::set(["D"])).unwrap();
        fx.clock.set(62_000);

        let submission = session.submit().unwrap();
        assert_eq!(session.state(), SessionState::Submitted);
        assert_eq!(submission.result.total_points_earned, 2);
        assert_eq!(submission.summary.time_spent_ms, 60_000);
        assert!(submission.cleared.is_written());
        assert!(submission.recorded.unwrap().is_written());

        // Progress is gone, history and telemetry have the attempt.
        assert!(ProgressStore::new(fx.backend.clone())
            .load(&ExamYear::new("111").unwrap())
            .is_none());
        let records = history.records(&ExamYear::new("111").unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].points_earned, 2);
        let sent = sink.summaries.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].session_id, session.session_id());
    }

    #[test]
    fn submitted_session_rejects_everything() {
        let fx = Fixture::new();
        let mut session = fx.open();
        let _ = session.answer(1, AnswerValue::text("A")).unwrap();
        let _ = session.submit().unwrap();

        assert!(session
            .answer(1, AnswerValue::text("B"))
            .unwrap_err()
            .is_terminal());
        assert!(matches!(
            session.toggle_bookmark(1),
            Err(SessionError::AlreadySubmitted(_))
        ));
        assert!(session.reset().is_err());
        assert!(matches!(
            session.submit(),
            Err(SessionError::AlreadySubmitted(_))
        ));
        assert!(fx.backend.get("gsat_exam_111_progress").unwrap().is_none());
    }

    #[test]
    fn reset_starts_over() {
        let fx = Fixture::new();
        let mut session = fx.open();
        let _ = session.answer(1, AnswerValue::text("A")).unwrap();
        let old_id = session.session_id().to_string();

        assert!(session.reset().unwrap().is_written());
        assert_eq!(session.state(), SessionState::NotStarted);
        assert_ne!(session.session_id(), old_id);
        assert!(session.snapshot().answers.is_empty());
        assert!(fx.backend.is_empty());
        assert_eq!(fx.open().state(), SessionState::NotStarted);
    }

    #[test]
    fn progress_report_figures() {
        let fx = Fixture::new();
        let mut session = fx.open();
        fx.clock.set(0);
        let _ = session.answer(1, AnswerValue::text("A")).unwrap();
        fx.clock.set(60_000);
        let _ = session.toggle_bookmark(2).unwrap();

        let report = session.progress(120_000);
        assert_eq!(report.answered, 1);
        assert_eq!(report.total, 3);
        assert!((report.completion - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.bookmarked, 1);
        assert_eq!(report.elapsed, Duration::from_secs(120));
        assert_eq!(report.remaining, Duration::from_secs(98 * 60));
        // Touched at 0 and 60s, so (120 + 60) / 2.
        assert_eq!(report.average_secs_per_question, Some(90.0));
        assert_eq!(report.estimated_minutes_remaining, Some(3.0));
    }

    #[test]
    fn pacing_distribution() {
        let fx = Fixture::new();
        let mut session = fx.open();
        assert!(session.time_distribution().is_none());

        fx.clock.set(0);
        let _ = session.answer(1, AnswerValue::text("A")).unwrap();
        fx.clock.set(30_000);
        let _ = session.answer(2, AnswerValue::text("x")).unwrap();
        fx.clock.set(120_000);
        let _ = session.toggle_bookmark(3).unwrap();

        let d = session.time_distribution().unwrap();
        assert_eq!(d.min_secs, 0);
        assert_eq!(d.max_secs, 90);
        assert_eq!(d.median_secs, 30);
        assert_eq!(d.average_secs, 40);
    }

    #[test]
    fn progress_survives_extreme_timestamps() {
        let fx = Fixture::new();
        let mut snapshot = ProgressSnapshot::new(ExamYear::new("111").unwrap(), "s", i64::MIN);
        snapshot.question_times.insert(1, i64::MIN);
        snapshot.question_times.insert(2, i64::MIN);
        assert!(ProgressStore::new(fx.backend.clone()).save(&snapshot).is_written());

        let report = fx.open().progress(i64::MAX);
        assert_eq!(report.remaining, Duration::ZERO);
        assert_eq!(report.elapsed, Duration::from_millis(i64::MAX as u64));
        assert!(report.average_secs_per_question.unwrap().is_finite());
    }

    #[test]
    fn progress_before_any_answer() {
        let fx = Fixture::new();
        let session = fx.open();
        let report = session.progress(1_000);
        assert_eq!(report.answered, 0);
        assert_eq!(report.average_secs_per_question, None);
        assert_eq!(report.estimated_minutes_remaining, None);
        assert_eq!(report.remaining, Duration::from_secs(100 * 60));
    }
}
