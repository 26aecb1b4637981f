//! Scoring engine.
//!
//! [`score`] is a pure function from an [`AnswerKey`] and the learner's
//! answers to a [`ScoringResult`]. It never fails: missing or malformed
//! answers simply score zero.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{AnswerKey, AnswerValue, Band, ExpectedAnswer, QuestionId, Section, SubmittedAnswer};

/// Sections below this correct ratio (in percent) get study advice.
pub const ADVICE_THRESHOLD: f64 = 70.0;

const KEEP_PRACTISING: &str =
    "Every section looks solid. Keep it up with more full-length practice exams!";

/// Outcome for a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    /// Question number.
    pub question: QuestionId,
    /// Section the question counts towards.
    pub section: Section,
    /// Whether a non-empty answer was given.
    pub answered: bool,
    /// Whether the answer matched the key.
    pub correct: bool,
    /// Points earned; either zero or `points_possible`.
    pub points_awarded: u32,
    /// Weight of the question in the key.
    pub points_possible: u32,
}

/// Aggregate for one section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionScore {
    /// Questions answered correctly.
    pub correct: u32,
    /// Questions in the section.
    pub total: u32,
    /// Points earned across the section.
    pub points_earned: u32,
    /// Sum of the section's question weights.
    pub points_possible: u32,
}

impl SectionScore {
    /// Share of questions answered correctly, in percent.
    pub fn correct_percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64 * 100.0
        }
    }

    /// Share of points earned, in percent.
    pub fn points_percentage(&self) -> f64 {
        percentage(self.points_earned, self.points_possible)
    }
}

/// The full result of scoring one exam attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub questions: Vec<QuestionOutcome>,
    pub sections: BTreeMap<Section, SectionScore>,
    pub total_points_earned: u32,
    pub total_points_possible: u32,
    pub percentage: f64,
    pub band: Band,
}

/// Score a set of answers against a key.
///
/// When the same question appears more than once, the last answer wins.
/// Answers to questions the key does not contain are ignored.
pub fn score<'a, I>(key: &AnswerKey, answers: I) -> ScoringResult
where
    I: IntoIterator<Item = &'a SubmittedAnswer>,
{
    let latest: BTreeMap<QuestionId, &AnswerValue> = answers
        .into_iter()
        .map(|a| (a.question, &a.value))
        .collect();
    score_values(key, &latest)
}

/// Score a plain `question -> value` map, as stored in a progress snapshot.
pub fn score_values<V>(key: &AnswerKey, answers: &BTreeMap<QuestionId, V>) -> ScoringResult
where
    V: Borrow<AnswerValue>,
{
    let mut questions = Vec::with_capacity(key.total_questions());
    let mut sections: BTreeMap<Section, SectionScore> = BTreeMap::new();
    let mut total_points_earned = 0u32;
    let mut total_points_possible = 0u32;

    for entry in key.entries() {
        let submitted = answers
            .get(&entry.question)
            .map(|v| Borrow::<AnswerValue>::borrow(v))
            .filter(|v| !v.is_empty());
        let correct = submitted.is_some_and(|v| is_correct(&entry.expected, v));
        let points_awarded = if correct { entry.points } else { 0 };

        let section = sections.entry(entry.section).or_default();
        section.total += 1;
        section.points_possible += entry.points;
        if correct {
            section.correct += 1;
            section.points_earned += entry.points;
        }

        total_points_possible += entry.points;
        total_points_earned += points_awarded;

        questions.push(QuestionOutcome {
            question: entry.question,
            section: entry.section,
            answered: submitted.is_some(),
            correct,
            points_awarded,
            points_possible: entry.points,
        });
    }

    let percentage = percentage(total_points_earned, total_points_possible);

    ScoringResult {
        questions,
        sections,
        total_points_earned,
        total_points_possible,
        percentage,
        band: Band::from_percentage(percentage),
    }
}

/// Check one submitted value against the expected answer.
pub fn is_correct(expected: &ExpectedAnswer, submitted: &AnswerValue) -> bool {
    match (expected, submitted) {
        (ExpectedAnswer::Choice { letter }, AnswerValue::Text(value)) => value == letter,
        (ExpectedAnswer::MultiSelect { letters }, AnswerValue::Set(values)) => values == letters,
        // A single checked box may arrive as plain text.
        (ExpectedAnswer::MultiSelect { letters }, AnswerValue::Text(value)) => {
            letters.len() == 1 && letters.contains(value)
        }
        (ExpectedAnswer::FillIn { token, synonyms }, AnswerValue::Text(value)) => {
            let typed = value.trim().to_lowercase();
            std::iter::once(token)
                .chain(synonyms.iter())
                .any(|accepted| accepted.trim().to_lowercase() == typed)
        }
        _ => false,
    }
}

fn percentage(earned: u32, possible: u32) -> f64 {
    if possible == 0 {
        0.0
    } else {
        100.0 * earned as f64 / possible as f64
    }
}

impl ScoringResult {
    /// Number of questions that received a non-empty answer.
    pub fn answered_count(&self) -> usize {
        self.questions.iter().filter(|q| q.answered).count()
    }

    /// Number of questions answered correctly.
    pub fn correct_count(&self) -> usize {
        self.questions.iter().filter(|q| q.correct).count()
    }

    /// Section with the lowest correct ratio; the earliest section wins ties.
    pub fn weakest_section(&self) -> Option<Section> {
        let mut weakest: Option<(Section, f64)> = None;
        for (section, s) in &self.sections {
            let pct = s.correct_percentage();
            if weakest.map_or(true, |(_, best)| pct < best) {
                weakest = Some((*section, pct));
            }
        }
        weakest.map(|(s, _)| s)
    }

    /// Section with the highest correct ratio; the earliest section wins ties.
    pub fn strongest_section(&self) -> Option<Section> {
        let mut strongest: Option<(Section, f64)> = None;
        for (section, s) in &self.sections {
            let pct = s.correct_percentage();
            if strongest.map_or(true, |(_, best)| pct > best) {
                strongest = Some((*section, pct));
            }
        }
        strongest.map(|(s, _)| s)
    }

    /// Study advice for every section below [`ADVICE_THRESHOLD`].
    pub fn recommendations(&self) -> Vec<String> {
        let advice: Vec<String> = self
            .sections
            .iter()
            .filter(|(_, s)| s.correct_percentage() < ADVICE_THRESHOLD)
            .map(|(section, _)| section.advice().to_string())
            .collect();
        if advice.is_empty() {
            vec![KEEP_PRACTISING.to_string()]
        } else {
            advice
        }
    }

    /// Questions answered incorrectly or left blank.
    pub fn missed_questions(&self) -> BTreeSet<QuestionId> {
        self.questions
            .iter()
            .filter(|q| !q.correct)
            .map(|q| q.question)
            .collect()
    }

    /// Format the result as markdown.
    pub fn to_markdown(&self, year: &str) -> String {
        let mut md = String::new();

        md.push_str(&format!("## Exam {year} result\n\n"));
        md.push_str(&format!(
            "**Score:** {} / {} ({:.1}%, {} {})\n\n",
            self.total_points_earned,
            self.total_points_possible,
            self.percentage,
            self.band,
            self.band.description()
        ));

        md.push_str("| Section | Correct | Points | % |\n");
        md.push_str("|---------|---------|--------|---|\n");
        for (section, s) in &self.sections {
            md.push_str(&format!(
                "| {} | {}/{} | {}/{} | {:.1}% |\n",
                section.title(),
                s.correct,
                s.total,
                s.points_earned,
                s.points_possible,
                s.points_percentage()
            ));
        }
        md.push('\n');

        md.push_str("### Recommendations\n\n");
        for rec in self.recommendations() {
            md.push_str(&format!("- {rec}\n"));
        }

        md
    }
}
