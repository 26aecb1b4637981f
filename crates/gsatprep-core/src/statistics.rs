//! Aggregate statistics over completed attempts.
//!
//! Cross-year comparison, an overall learner profile and recent activity,
//! computed from [`ExamRecord`]s, plus pacing figures for a single session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::history::ExamRecord;
use crate::model::{ExamYear, QuestionId, Section};

/// Attempts listed by [`recent_activity`].
pub const RECENT_ACTIVITY_LIMIT: usize = 5;

/// Statistics for a single exam year across all attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearStats {
    /// Exam year.
    pub year: ExamYear,
    /// Number of recorded attempts.
    pub attempts: usize,
    /// Mean percentage.
    pub average_percentage: f64,
    /// Best percentage.
    pub best_percentage: f64,
    /// Mean time spent in milliseconds.
    pub average_time_ms: i64,
    /// Completion time of the most recent attempt.
    pub last_attempt: i64,
    /// Correct ratio per section, in percent.
    pub section_performance: BTreeMap<Section, f64>,
}

/// Overall statistics for the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    /// Attempts across all years.
    pub exams_taken: usize,
    /// Total time spent in milliseconds.
    pub total_practice_ms: i64,
    /// Mean percentage across all attempts.
    pub average_percentage: f64,
    /// Section with the best pooled correct ratio.
    pub strongest_section: Option<Section>,
    /// Section with the worst pooled correct ratio.
    pub weakest_section: Option<Section>,
    /// Relative change from the first to the latest attempt, in percent.
    pub improvement_rate: f64,
}

/// One line of recent activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentAttempt {
    pub year: ExamYear,
    /// Completion time, epoch milliseconds.
    pub completed_at: i64,
    pub percentage: f64,
    pub time_spent_ms: i64,
}

/// Spread of time spent per question, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeDistribution {
    pub min_secs: i64,
    pub max_secs: i64,
    /// Upper median for an even count.
    pub median_secs: i64,
    pub average_secs: i64,
    /// Population standard deviation.
    pub std_dev_secs: i64,
}

/// Compute per-year statistics from records grouped by year.
pub fn compare_years(records: &BTreeMap<ExamYear, Vec<ExamRecord>>) -> BTreeMap<ExamYear, YearStats> {
    let mut comparison = BTreeMap::new();

    for (year, year_records) in records {
        if year_records.is_empty() {
            continue;
        }
        let n = year_records.len();

        let average_percentage = year_records.iter().map(|r| r.percentage).sum::<f64>() / n as f64;
        let best_percentage = year_records
            .iter()
            .map(|r| r.percentage)
            .fold(f64::NEG_INFINITY, f64::max);
        let average_time_ms = saturating_total(year_records.iter().map(|r| r.time_spent_ms)) / n as i64;
        let last_attempt = year_records
            .iter()
            .map(|r| r.completed_at)
            .max()
            .unwrap_or_default();

        comparison.insert(
            year.clone(),
            YearStats {
                year: year.clone(),
                attempts: n,
                average_percentage,
                best_percentage,
                average_time_ms,
                last_attempt,
                section_performance: pooled_section_performance(year_records),
            },
        );
    }

    comparison
}

/// Compute the overall learner profile from chronological records.
pub fn learner_profile(records: &[ExamRecord]) -> LearnerProfile {
    let n = records.len();
    let average_percentage = if n == 0 {
        0.0
    } else {
        records.iter().map(|r| r.percentage).sum::<f64>() / n as f64
    };

    let performance = pooled_section_performance(records);
    let mut strongest: Option<(Section, f64)> = None;
    let mut weakest: Option<(Section, f64)> = None;
    for (&section, &pct) in &performance {
        if strongest.map_or(true, |(_, best)| pct > best) {
            strongest = Some((section, pct));
        }
        if weakest.map_or(true, |(_, worst)| pct < worst) {
            weakest = Some((section, pct));
        }
    }

    LearnerProfile {
        exams_taken: n,
        total_practice_ms: saturating_total(records.iter().map(|r| r.time_spent_ms)),
        average_percentage,
        strongest_section: strongest.map(|(s, _)| s),
        weakest_section: weakest.map(|(s, _)| s),
        improvement_rate: improvement_rate(records),
    }
}

/// `(last - first) / first * 100`; 0 with fewer than two attempts or a zero start.
pub fn improvement_rate(records: &[ExamRecord]) -> f64 {
    let mut sorted: Vec<&ExamRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.completed_at);

    match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) if sorted.len() >= 2 && first.percentage > 0.0 => {
            (last.percentage - first.percentage) / first.percentage * 100.0
        }
        _ => 0.0,
    }
}

/// The last [`RECENT_ACTIVITY_LIMIT`] attempts, oldest first.
pub fn recent_activity(records: &[ExamRecord]) -> Vec<RecentAttempt> {
    let mut sorted: Vec<&ExamRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.completed_at);
    let skip = sorted.len().saturating_sub(RECENT_ACTIVITY_LIMIT);

    sorted
        .into_iter()
        .skip(skip)
        .map(|r| RecentAttempt {
            year: r.exam_year.clone(),
            completed_at: r.completed_at,
            percentage: r.percentage,
            time_spent_ms: r.time_spent_ms,
        })
        .collect()
}

/// Time charged to each touched question, in milliseconds.
///
/// Questions are taken in first-touch order; each one is charged the gap
/// since the previous first touch, the first one the gap since `start_time`.
pub fn question_durations(start_time: i64, first_touch: &BTreeMap<QuestionId, i64>) -> Vec<i64> {
    let mut touches: Vec<i64> = first_touch.values().copied().collect();
    touches.sort_unstable();

    let mut previous = start_time;
    touches
        .into_iter()
        .map(|t| {
            let gap = t.saturating_sub(previous).max(0);
            previous = previous.max(t);
            gap
        })
        .collect()
}

/// Min, max, median, mean and standard deviation of `durations_ms`.
pub fn time_distribution(durations_ms: &[i64]) -> Option<TimeDistribution> {
    if durations_ms.is_empty() {
        return None;
    }
    let mut sorted = durations_ms.to_vec();
    sorted.sort_unstable();

    let n = sorted.len() as f64;
    let mean = sorted.iter().map(|&d| d as f64).sum::<f64>() / n;
    let variance = sorted.iter().map(|&d| (d as f64 - mean).powi(2)).sum::<f64>() / n;

    Some(TimeDistribution {
        min_secs: ms_to_secs(sorted[0] as f64),
        max_secs: ms_to_secs(sorted[sorted.len() - 1] as f64),
        median_secs: ms_to_secs(sorted[sorted.len() / 2] as f64),
        average_secs: ms_to_secs(mean),
        std_dev_secs: ms_to_secs(variance.sqrt()),
    })
}

fn ms_to_secs(ms: f64) -> i64 {
    (ms / 1000.0).round() as i64
}

fn saturating_total(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0i64, i64::saturating_add)
}

fn pooled_section_performance(records: &[ExamRecord]) -> BTreeMap<Section, f64> {
    let mut totals: BTreeMap<Section, (u32, u32)> = BTreeMap::new();
    for r in records {
        for (section, s) in &r.sections {
            let entry = totals.entry(*section).or_default();
            entry.0 += s.correct;
            entry.1 += s.total;
        }
    }

    totals
        .into_iter()
        .map(|(section, (correct, total))| {
            let pct = if total == 0 {
                0.0
            } else {
                correct as f64 / total as f64 * 100.0
            };
            (section, pct)
        })
        .collect()
}
