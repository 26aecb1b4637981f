//! The `gsat history` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde::Serialize;

use gsatprep_core::history::{ExamRecord, ResultHistory};
use gsatprep_core::model::ExamYear;
use gsatprep_core::statistics::{
    compare_years, learner_profile, recent_activity, LearnerProfile, RecentAttempt, YearStats,
};

use super::progress::format_time;
use super::{load_config, open_store};
use crate::Format;

#[derive(Serialize)]
struct HistoryReport {
    years: BTreeMap<ExamYear, YearStats>,
    profile: LearnerProfile,
    recent: Vec<RecentAttempt>,
    records: Vec<ExamRecord>,
}

pub fn execute(year: Option<String>, format: Format, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let history = ResultHistory::new(open_store(&config));

    let mut by_year = history.by_year();
    if let Some(year) = &year {
        let year = ExamYear::new(year.as_str()).context("invalid --year")?;
        by_year.retain(|y, _| *y == year);
    }

    let mut records: Vec<ExamRecord> = by_year.values().flatten().cloned().collect();
    records.sort_by_key(|r| r.completed_at);

    let report = HistoryReport {
        years: compare_years(&by_year),
        profile: learner_profile(&records),
        recent: recent_activity(&records),
        records,
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Markdown => anyhow::bail!("markdown output is not available for history"),
        Format::Text => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &HistoryReport) {
    if report.records.is_empty() {
        println!("No completed exams yet.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Exam", "Attempts", "Average", "Best", "Avg time", "Last attempt"]);
    for (year, stats) in &report.years {
        table.add_row(vec![
            Cell::new(year),
            Cell::new(stats.attempts),
            Cell::new(format!("{:.1}%", stats.average_percentage)),
            Cell::new(format!("{:.1}%", stats.best_percentage)),
            Cell::new(format!("{} min", stats.average_time_ms / 60_000)),
            Cell::new(format_time(stats.last_attempt)),
        ]);
    }
    println!("{table}");

    let p = &report.profile;
    println!("\nExams taken:    {}", p.exams_taken);
    println!("Practice time:  {} min", p.total_practice_ms / 60_000);
    println!("Average score:  {:.1}%", p.average_percentage);
    if let Some(s) = p.strongest_section {
        println!("Strongest:      {}", s.title());
    }
    if let Some(s) = p.weakest_section {
        println!("Weakest:        {}", s.title());
    }
    println!("Improvement:    {:+.1}%", p.improvement_rate);

    println!("\nRecent attempts:");
    for r in report.recent.iter().rev() {
        println!(
            "  {}  exam {:<6} {:>5.1}%  {} min",
            format_time(r.completed_at),
            r.year.as_str(),
            r.percentage,
            r.time_spent_ms / 60_000
        );
    }
}
