//! The `gsat progress` commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use comfy_table::{Cell, Table};

use gsatprep_core::model::ExamYear;
use gsatprep_core::progress::{ProgressStore, WriteOutcome};

use super::{load_config, open_store};
use crate::ProgressAction;

pub fn execute(action: ProgressAction, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let store = ProgressStore::new(open_store(&config));

    match action {
        ProgressAction::Show { year } => {
            let year = parse_year(&year)?;
            let Some(snapshot) = store.load(&year) else {
                println!("No saved progress for exam {year}.");
                return Ok(());
            };

            println!("Exam {year}, session {}", snapshot.session_id);
            println!("  Started:    {}", format_time(snapshot.start_time));
            println!("  Last saved: {}", format_time(snapshot.last_saved));

            let mut table = Table::new();
            table.set_header(vec!["Question", "Answer", "Bookmarked"]);
            let mut questions: Vec<u32> = snapshot
                .answers
                .keys()
                .chain(snapshot.bookmarks.iter())
                .copied()
                .collect();
            questions.sort_unstable();
            questions.dedup();
            for q in questions {
                table.add_row(vec![
                    Cell::new(q),
                    Cell::new(
                        snapshot
                            .answers
                            .get(&q)
                            .map(|a| a.to_string())
                            .unwrap_or_default(),
                    ),
                    Cell::new(if snapshot.bookmarks.contains(&q) { "yes" } else { "" }),
                ]);
            }
            println!("{table}");
            println!(
                "{} answered, {} bookmarked",
                snapshot.answers.len(),
                snapshot.bookmarks.len()
            );
        }
        ProgressAction::Clear { year } => {
            let year = parse_year(&year)?;
            match store.clear(&year) {
                WriteOutcome::Failed(e) => {
                    return Err(e).with_context(|| format!("could not clear progress for exam {year}"));
                }
                _ => println!("Cleared saved progress for exam {year}."),
            }
        }
    }

    Ok(())
}

fn parse_year(raw: &str) -> Result<ExamYear> {
    ExamYear::new(raw).context("invalid --year")
}

pub(crate) fn format_time(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}
