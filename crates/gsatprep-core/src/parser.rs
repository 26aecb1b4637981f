//! TOML answer-key parser.
//!
//! Loads one [`AnswerKey`] per exam year from TOML files and directories,
//! and checks them for mistakes that parse but would silently mis-score.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::model::{AnswerKey, ExamYear, ExpectedAnswer, KeyEntry, QuestionId, Section};

/// Intermediate TOML structure for parsing answer-key files.
#[derive(Debug, Deserialize)]
struct TomlKeyFile {
    exam: TomlExamHeader,
    #[serde(default)]
    sections: Vec<TomlSectionRange>,
    #[serde(default)]
    answers: BTreeMap<String, TomlAnswer>,
}

#[derive(Debug, Deserialize)]
struct TomlExamHeader {
    year: String,
    max_score: u32,
    #[serde(default = "default_time_limit_mins")]
    time_limit_mins: u64,
}

fn default_time_limit_mins() -> u64 {
    100
}

#[derive(Debug, Deserialize)]
struct TomlSectionRange {
    section: String,
    range: [QuestionId; 2],
    points: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TomlAnswer {
    Choice(String),
    MultiSelect(Vec<String>),
    FillIn {
        fill: String,
        #[serde(default)]
        synonyms: Vec<String>,
    },
}

impl From<TomlAnswer> for ExpectedAnswer {
    fn from(answer: TomlAnswer) -> Self {
        match answer {
            TomlAnswer::Choice(letter) => ExpectedAnswer::choice(letter),
            TomlAnswer::MultiSelect(letters) => ExpectedAnswer::multi(letters),
            TomlAnswer::FillIn { fill, synonyms } => ExpectedAnswer::fill_in(fill, synonyms),
        }
    }
}

/// Parse a single TOML file into an `AnswerKey`.
pub fn parse_exam_key(path: &Path) -> Result<AnswerKey> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answer key file: {}", path.display()))?;

    parse_exam_key_str(&content, path)
}

/// Parse a TOML string into an `AnswerKey` (useful for testing).
pub fn parse_exam_key_str(content: &str, source_path: &Path) -> Result<AnswerKey> {
    let parsed: TomlKeyFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let year = ExamYear::new(parsed.exam.year)
        .with_context(|| format!("invalid exam year in {}", source_path.display()))?;

    let time_limit_secs = match parsed.exam.time_limit_mins {
        0 => bail!("{}: time_limit_mins must be positive", source_path.display()),
        mins => mins.checked_mul(60).with_context(|| {
            format!("{}: time_limit_mins {mins} is too large", source_path.display())
        })?,
    };

    let ranges = parse_ranges(parsed.sections)
        .with_context(|| format!("invalid sections in {}", source_path.display()))?;

    let entries = parsed
        .answers
        .into_iter()
        .map(|(id, answer)| {
            let question: QuestionId = id.trim().parse().with_context(|| {
                format!("{}: answer key '{id}' is not a question number", source_path.display())
            })?;
            let Some(range) = ranges.iter().find(|r| r.contains(question)) else {
                bail!(
                    "{}: question {question} is not inside any section range",
                    source_path.display()
                );
            };
            Ok(KeyEntry {
                question,
                expected: answer.into(),
                section: range.section,
                points: range.points,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let key = AnswerKey::new(year, parsed.exam.max_score, entries)
        .with_context(|| format!("invalid answer key: {}", source_path.display()))?;

    Ok(key.with_time_limit(Duration::from_secs(time_limit_secs)))
}

#[derive(Debug)]
struct SectionRange {
    section: Section,
    first: QuestionId,
    last: QuestionId,
    points: u32,
}

impl SectionRange {
    fn contains(&self, question: QuestionId) -> bool {
        (self.first..=self.last).contains(&question)
    }
}

fn parse_ranges(raw: Vec<TomlSectionRange>) -> Result<Vec<SectionRange>> {
    let mut ranges = raw
        .into_iter()
        .map(|r| {
            let section: Section = r.section.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let [first, last] = r.range;
            if first > last {
                bail!("range [{first}, {last}] for {section} is reversed");
            }
            Ok(SectionRange {
                section,
                first,
                last,
                points: r.points,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    ranges.sort_by_key(|r| r.first);
    for pair in ranges.windows(2) {
        if pair[1].first <= pair[0].last {
            bail!(
                "{} range [{}, {}] overlaps {} range [{}, {}]",
                pair[1].section,
                pair[1].first,
                pair[1].last,
                pair[0].section,
                pair[0].first,
                pair[0].last
            );
        }
    }

    Ok(ranges)
}

/// Recursively load all `.toml` answer-key files from a directory.
pub fn load_key_directory(dir: &Path) -> Result<Vec<AnswerKey>> {
    let mut keys = Vec::new();

    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            keys.extend(load_key_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_exam_key(&path) {
                Ok(key) => keys.push(key),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    keys.sort_by(|a, b| a.year().cmp(b.year()));
    Ok(keys)
}

/// A warning from answer-key validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question (if applicable).
    pub question: Option<QuestionId>,
    /// Warning message.
    pub message: String,
}

/// Check a key for answers that parse but are unlikely to ever match.
pub fn validate_exam_key(key: &AnswerKey) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for entry in key.entries() {
        let q = entry.question;
        match &entry.expected {
            // Choice matching is case-sensitive and the UI submits upper-case letters.
            ExpectedAnswer::Choice { letter } => {
                if !is_choice_letter(letter) {
                    warnings.push(ValidationWarning {
                        question: Some(q),
                        message: format!("choice answer '{letter}' is not a single upper-case letter"),
                    });
                }
            }
            ExpectedAnswer::MultiSelect { letters } => {
                if letters.len() == 1 {
                    warnings.push(ValidationWarning {
                        question: Some(q),
                        message: "multi-select answer has only one letter".into(),
                    });
                }
                if let Some(bad) = letters.iter().find(|l| !is_choice_letter(l)) {
                    warnings.push(ValidationWarning {
                        question: Some(q),
                        message: format!("multi-select letter '{bad}' is not a single upper-case letter"),
                    });
                }
            }
            ExpectedAnswer::FillIn { token, synonyms } => {
                let norm = token.trim().to_lowercase();
                if synonyms.iter().any(|s| s.trim().to_lowercase() == norm) {
                    warnings.push(ValidationWarning {
                        question: Some(q),
                        message: format!("synonym repeats the answer '{token}'"),
                    });
                }
            }
        }
    }

    warnings
}

fn is_choice_letter(letter: &str) -> bool {
    let mut chars = letter.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_uppercase())
}
