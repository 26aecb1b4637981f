//! Error types for answer keys, storage and exam sessions.
//!
//! Only [`KeyError`] is meant to abort anything: keys are validated once at
//! startup. Storage errors are downgraded to warnings at the
//! [`ProgressStore`](crate::progress::ProgressStore) boundary, and session
//! errors only report misuse of the state machine.

use thiserror::Error;

use crate::model::QuestionId;

/// Reasons an answer key fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The exam year is blank.
    #[error("exam year must not be empty")]
    EmptyYear,

    /// The key has no questions at all.
    #[error("answer key has no questions")]
    Empty,

    /// Question ids start at 1.
    #[error("question id 0 is not allowed")]
    ZeroQuestion,

    /// The same question id appears more than once.
    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    /// A question id inside `[1, total]` has no entry.
    #[error("question {missing} is missing (key covers 1..={total})")]
    MissingQuestion { missing: QuestionId, total: QuestionId },

    /// A question is worth zero points.
    #[error("question {0} must be worth at least one point")]
    ZeroPoints(QuestionId),

    /// The expected answer for a question is blank or an empty set.
    #[error("question {0} has an empty expected answer")]
    EmptyAnswer(QuestionId),

    /// Point values do not add up to the published maximum.
    #[error("point values sum to {actual}, expected max score {expected}")]
    MaxScoreMismatch { expected: u32, actual: u32 },

    /// Point values add up to more than a `u32` can hold.
    #[error("point values overflow at question {0}")]
    PointsOverflow(QuestionId),
}

/// Failures of the underlying key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused the write because it is full.
    #[error("storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    /// The snapshot could not be encoded.
    #[error("failed to serialize {0}: {1}")]
    Serialize(&'static str, #[source] serde_json::Error),

    /// The key holds characters a file-backed store cannot name a file with.
    #[error("invalid storage key '{0}': only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidKey(String),

    /// Filesystem-level failure.
    #[error("storage I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The store's internal lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Misuse of the exam session state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The exam was already submitted; start a fresh session instead.
    #[error("exam {0} has already been submitted")]
    AlreadySubmitted(String),

    /// The question id is not part of this exam.
    #[error("question {question} is not part of exam {year}")]
    UnknownQuestion { question: QuestionId, year: String },
}

impl SessionError {
    /// Returns `true` if the session can never accept input again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionError::AlreadySubmitted(_))
    }
}
