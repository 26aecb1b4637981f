//! Core data model types for gsatprep.
//!
//! These are the types the whole system shares: exam years, sections,
//! answer keys and the answers a learner submits.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Question number within an exam, starting at 1.
pub type QuestionId = u32;

/// Default exam duration (100 minutes).
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(100 * 60);

/// Identifier of an exam year, e.g. `"114"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExamYear(String);

impl ExamYear {
    pub fn new(year: impl Into<String>) -> Result<Self, KeyError> {
        let year = year.into().trim().to_string();
        if year.is_empty() {
            return Err(KeyError::EmptyYear);
        }
        Ok(Self(year))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExamYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExamYear {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExamYear::new(s)
    }
}

/// A scored subdivision of the exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    #[serde(alias = "vocab")]
    Vocabulary,
    Cloze,
    #[serde(alias = "fill", alias = "fill_in")]
    FillIn,
    Structure,
    Reading,
    Mixed,
}

impl Section {
    /// All sections in exam order.
    pub const ALL: [Section; 6] = [
        Section::Vocabulary,
        Section::Cloze,
        Section::FillIn,
        Section::Structure,
        Section::Reading,
        Section::Mixed,
    ];

    /// Human-readable section title.
    pub fn title(&self) -> &'static str {
        match self {
            Section::Vocabulary => "Vocabulary",
            Section::Cloze => "Cloze",
            Section::FillIn => "Fill-in",
            Section::Structure => "Discourse Structure",
            Section::Reading => "Reading Comprehension",
            Section::Mixed => "Mixed Questions",
        }
    }

    /// Study advice shown when a learner does poorly in this section.
    pub fn advice(&self) -> &'static str {
        match self {
            Section::Vocabulary => {
                "Grow your vocabulary: drill high-frequency words and watch for changes in part of speech."
            }
            Section::Cloze => {
                "Strengthen grammar: practise sentence analysis and judging meaning from context."
            }
            Section::FillIn => {
                "Read for meaning: practise inferring the missing word from the surrounding text."
            }
            Section::Structure => {
                "Work on paragraph logic: practise ordering sentences and spotting transitions."
            }
            Section::Reading => {
                "Read more widely: practise skimming for the main idea and locating details quickly."
            }
            Section::Mixed => {
                "Read each prompt carefully: mind spelling on fill-ins and select every correct option."
            }
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Vocabulary => write!(f, "vocabulary"),
            Section::Cloze => write!(f, "cloze"),
            Section::FillIn => write!(f, "fillIn"),
            Section::Structure => write!(f, "structure"),
            Section::Reading => write!(f, "reading"),
            Section::Mixed => write!(f, "mixed"),
        }
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vocabulary" | "vocab" => Ok(Section::Vocabulary),
            "cloze" => Ok(Section::Cloze),
            "fillin" | "fill" | "fill_in" => Ok(Section::FillIn),
            "structure" => Ok(Section::Structure),
            "reading" => Ok(Section::Reading),
            "mixed" => Ok(Section::Mixed),
            other => Err(format!("unknown section: {other}")),
        }
    }
}

/// What the key expects for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ExpectedAnswer {
    /// A single choice letter, matched exactly.
    Choice { letter: String },
    /// Every letter in the set must be selected, and nothing else.
    MultiSelect { letters: BTreeSet<String> },
    /// A typed word, matched case-insensitively against the token or a synonym.
    FillIn {
        token: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        synonyms: Vec<String>,
    },
}

impl ExpectedAnswer {
    pub fn choice(letter: impl Into<String>) -> Self {
        ExpectedAnswer::Choice {
            letter: letter.into(),
        }
    }

    pub fn multi<I, S>(letters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExpectedAnswer::MultiSelect {
            letters: letters.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fill_in(token: impl Into<String>, synonyms: Vec<String>) -> Self {
        ExpectedAnswer::FillIn {
            token: token.into(),
            synonyms,
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            ExpectedAnswer::Choice { letter } => letter.trim().is_empty(),
            ExpectedAnswer::MultiSelect { letters } => {
                letters.is_empty() || letters.iter().any(|l| l.trim().is_empty())
            }
            ExpectedAnswer::FillIn { token, .. } => token.trim().is_empty(),
        }
    }
}

impl fmt::Display for ExpectedAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedAnswer::Choice { letter } => f.write_str(letter),
            ExpectedAnswer::MultiSelect { letters } => {
                let joined: Vec<&str> = letters.iter().map(String::as_str).collect();
                f.write_str(&joined.join(", "))
            }
            ExpectedAnswer::FillIn { token, .. } => f.write_str(token),
        }
    }
}

/// One question's expected answer, section and weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyEntry {
    /// Question number, starting at 1.
    pub question: QuestionId,
    /// The answer that earns the points.
    pub expected: ExpectedAnswer,
    /// Section the question is reported under.
    pub section: Section,
    /// Points awarded for a correct answer; never zero.
    pub points: u32,
}

/// A validated, immutable answer key for one exam year.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerKey {
    year: ExamYear,
    max_score: u32,
    #[serde(skip)]
    time_limit: Duration,
    entries: BTreeMap<QuestionId, KeyEntry>,
}

impl AnswerKey {
    /// Build and validate a key.
    ///
    /// Question ids must cover `1..=n` exactly once, every question must be
    /// worth at least one point, and the points must add up to `max_score`.
    pub fn new(year: ExamYear, max_score: u32, entries: Vec<KeyEntry>) -> Result<Self, KeyError> {
        if entries.is_empty() {
            return Err(KeyError::Empty);
        }

        let mut map = BTreeMap::new();
        for entry in entries {
            if entry.question == 0 {
                return Err(KeyError::ZeroQuestion);
            }
            if entry.points == 0 {
                return Err(KeyError::ZeroPoints(entry.question));
            }
            if entry.expected.is_blank() {
                return Err(KeyError::EmptyAnswer(entry.question));
            }
            let question = entry.question;
            if map.insert(question, entry).is_some() {
                return Err(KeyError::DuplicateQuestion(question));
            }
        }

        // Ids are unique and positive, so a gap exists iff the largest id exceeds the count.
        let total = map.len() as QuestionId;
        if let Some(missing) = (1..=total).find(|q| !map.contains_key(q)) {
            return Err(KeyError::MissingQuestion { missing, total });
        }

        let actual = map.values().try_fold(0u32, |sum, e| {
            sum.checked_add(e.points)
                .ok_or(KeyError::PointsOverflow(e.question))
        })?;
        if actual != max_score {
            return Err(KeyError::MaxScoreMismatch {
                expected: max_score,
                actual,
            });
        }

        Ok(Self {
            year,
            max_score,
            time_limit: DEFAULT_TIME_LIMIT,
            entries: map,
        })
    }

    /// Override the exam duration.
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn year(&self) -> &ExamYear {
        &self.year
    }

    pub fn max_score(&self) -> u32 {
        self.max_score
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    pub fn total_questions(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, question: QuestionId) -> Option<&KeyEntry> {
        self.entries.get(&question)
    }

    pub fn contains(&self, question: QuestionId) -> bool {
        self.entries.contains_key(&question)
    }

    /// Entries in question order.
    pub fn entries(&self) -> impl Iterator<Item = &KeyEntry> {
        self.entries.values()
    }

    /// Sections that appear in this key, in exam order.
    pub fn sections(&self) -> Vec<Section> {
        let present: BTreeSet<Section> = self.entries.values().map(|e| e.section).collect();
        present.into_iter().collect()
    }
}

/// A value the learner selected or typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Set(BTreeSet<String>),
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        AnswerValue::Text(value.into())
    }

    pub fn set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnswerValue::Set(values.into_iter().map(Into::into).collect())
    }

    /// An empty string or empty set counts as unanswered.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(s) => s.trim().is_empty(),
            AnswerValue::Set(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Text(s) => f.write_str(s),
            AnswerValue::Set(s) => {
                let joined: Vec<&str> = s.iter().map(String::as_str).collect();
                f.write_str(&joined.join(", "))
            }
        }
    }
}

/// One captured answer event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question: QuestionId,
    pub value: AnswerValue,
    /// Capture time in epoch milliseconds.
    #[serde(default)]
    pub captured_at: i64,
}

impl SubmittedAnswer {
    pub fn new(question: QuestionId, value: AnswerValue, captured_at: i64) -> Self {
        Self {
            question,
            value,
            captured_at,
        }
    }
}

/// Qualitative grade derived from a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl Band {
    /// Map a percentage onto a band; each threshold is inclusive.
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Band::APlus
        } else if percentage >= 80.0 {
            Band::A
        } else if percentage >= 70.0 {
            Band::BPlus
        } else if percentage >= 60.0 {
            Band::B
        } else if percentage >= 50.0 {
            Band::CPlus
        } else {
            Band::C
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Band::APlus => "excellent",
            Band::A => "very good",
            Band::BPlus => "above average",
            Band::B => "average",
            Band::CPlus => "needs work",
            Band::C => "needs significant work",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Band::APlus => "A+",
            Band::A => "A",
            Band::BPlus => "B+",
            Band::B => "B",
            Band::CPlus => "C+",
            Band::C => "C",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year() -> ExamYear {
        ExamYear::new("114").unwrap()
    }

    fn entry(question: QuestionId, points: u32) -> KeyEntry {
        KeyEntry {
            question,
            expected: ExpectedAnswer::choice("A"),
            section: Section::Vocabulary,
            points,
        }
    }

    #[test]
    fn section_display_and_parse() {
        assert_eq!(Section::FillIn.to_string(), "fillIn");
        assert_eq!("vocab".parse::<Section>().unwrap(), Section::Vocabulary);
        assert_eq!("fill".parse::<Section>().unwrap(), Section::FillIn);
        assert_eq!("Reading".parse::<Section>().unwrap(), Section::Reading);
        assert!("grammar".parse::<Section>().is_err());
    }

    #[test]
    fn section_serde_accepts_aliases() {
        let s: Section = serde_json::from_str("\"vocab\"").unwrap();
        assert_eq!(s, Section::Vocabulary);
        let s: Section = serde_json::from_str("\"fill\"").unwrap();
        assert_eq!(s, Section::FillIn);
        assert_eq!(serde_json::to_string(&Section::FillIn).unwrap(), "\"fillIn\"");
    }

    #[test]
    fn exam_year_rejects_blank() {
        assert_eq!(ExamYear::new("  "), Err(KeyError::EmptyYear));
        assert_eq!(ExamYear::new(" 113 ").unwrap().as_str(), "113");
    }

    #[test]
    fn key_accepts_contiguous_ids() {
        let key = AnswerKey::new(year(), 4, vec![entry(2, 1), entry(1, 1), entry(3, 2)]).unwrap();
        assert_eq!(key.total_questions(), 3);
        assert_eq!(key.max_score(), 4);
        let ids: Vec<_> = key.entries().map(|e| e.question).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn key_rejects_gap() {
        let err = AnswerKey::new(year(), 2, vec![entry(1, 1), entry(3, 1)]).unwrap_err();
        assert_eq!(err, KeyError::MissingQuestion { missing: 2, total: 2 });
    }

    #[test]
    fn key_rejects_duplicate() {
        let err = AnswerKey::new(year(), 2, vec![entry(1, 1), entry(1, 1)]).unwrap_err();
        assert_eq!(err, KeyError::DuplicateQuestion(1));
    }

    #[test]
    fn key_rejects_zero_points_and_zero_id() {
        assert_eq!(
            AnswerKey::new(year(), 0, vec![entry(1, 0)]).unwrap_err(),
            KeyError::ZeroPoints(1)
        );
        assert_eq!(
            AnswerKey::new(year(), 1, vec![entry(0, 1)]).unwrap_err(),
            KeyError::ZeroQuestion
        );
    }

    #[test]
    fn key_rejects_wrong_max_score() {
        let err = AnswerKey::new(year(), 10, vec![entry(1, 1), entry(2, 2)]).unwrap_err();
        assert_eq!(
            err,
            KeyError::MaxScoreMismatch {
                expected: 10,
                actual: 3
            }
        );
    }

    #[test]
    fn key_rejects_overflowing_points() {
        let err = AnswerKey::new(year(), 1, vec![entry(1, u32::MAX), entry(2, 2)]).unwrap_err();
        assert_eq!(err, KeyError::PointsOverflow(2));
    }

    #[test]
    fn key_rejects_empty_multi_select() {
        let bad = KeyEntry {
            question: 1,
            expected: ExpectedAnswer::MultiSelect {
                letters: BTreeSet::new(),
            },
            section: Section::Mixed,
            points: 2,
        };
        assert_eq!(
            AnswerKey::new(year(), 2, vec![bad]).unwrap_err(),
            KeyError::EmptyAnswer(1)
        );
    }

    #[test]
    fn band_thresholds_are_inclusive() {
        assert_eq!(Band::from_percentage(100.0), Band::APlus);
        assert_eq!(Band::from_percentage(90.0), Band::APlus);
        assert_eq!(Band::from_percentage(89.9), Band::A);
        assert_eq!(Band::from_percentage(80.0), Band::A);
        assert_eq!(Band::from_percentage(70.0), Band::BPlus);
        assert_eq!(Band::from_percentage(60.0), Band::B);
        assert_eq!(Band::from_percentage(50.0), Band::CPlus);
        assert_eq!(Band::from_percentage(49.99), Band::C);
        assert_eq!(Band::from_percentage(0.0), Band::C);
        assert_eq!(Band::APlus.to_string(), "A+");
    }

    #[test]
    fn answer_value_json_shapes() {
        let text: AnswerValue = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(text, AnswerValue::text("A"));
        let set: AnswerValue = serde_json::from_str("[\"D\", \"C\"]").unwrap();
        assert_eq!(set, AnswerValue::set(["C", "D"]));
        assert!(AnswerValue::text("  ").is_empty());
    }
}
