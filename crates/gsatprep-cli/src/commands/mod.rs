//! Subcommand implementations and the helpers they share.

pub mod history;
pub mod init;
pub mod progress;
pub mod score;
pub mod session;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use gsatprep_core::model::AnswerKey;
use gsatprep_core::scoring::ScoringResult;
use gsatprep_core::store::FileStore;
use gsatprep_core::traits::KeyValueStore;
use gsatprep_sync::config::{load_config_from, GsatConfig};

use crate::{Format, KeyArgs};

pub(crate) fn load_config(path: Option<&Path>) -> Result<GsatConfig> {
    load_config_from(path)
}

pub(crate) fn open_store(config: &GsatConfig) -> Arc<dyn KeyValueStore> {
    tracing::debug!(dir = %config.store_dir.display(), "using file store");
    Arc::new(FileStore::new(config.store_dir.clone()))
}

/// The key file named by `--key`, or `<keys_dir>/<year>.toml` for `--year`.
pub(crate) fn key_path(config: &GsatConfig, args: &KeyArgs) -> Result<PathBuf> {
    match (&args.key, &args.year) {
        (Some(path), _) => Ok(path.clone()),
        (None, Some(year)) => {
            let year = year.trim();
            let valid = !year.is_empty()
                && year.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                anyhow::bail!("invalid --year '{year}'");
            }
            Ok(config.keys_dir.join(format!("{year}.toml")))
        }
        (None, None) => anyhow::bail!("either --key or --year is required"),
    }
}

pub(crate) fn load_key(path: &Path) -> Result<AnswerKey> {
    gsatprep_core::parser::parse_exam_key(path)
        .with_context(|| format!("could not load answer key {}", path.display()))
}

/// Print a scoring result in the requested format.
pub(crate) fn print_result(result: &ScoringResult, year: &str, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(result)?),
        Format::Markdown => print!("{}", result.to_markdown(year)),
        Format::Text => print_summary(result, year),
    }
    Ok(())
}

fn print_summary(result: &ScoringResult, year: &str) {
    println!(
        "Exam {year}: {}/{} ({:.1}%) band {} ({})",
        result.total_points_earned,
        result.total_points_possible,
        result.percentage,
        result.band,
        result.band.description()
    );
    println!(
        "Answered {}/{}, correct {}",
        result.answered_count(),
        result.questions.len(),
        result.correct_count()
    );

    let mut table = Table::new();
    table.set_header(vec!["Section", "Correct", "Points", "Correct %"]);
    for (section, s) in &result.sections {
        table.add_row(vec![
            Cell::new(section.title()),
            Cell::new(format!("{}/{}", s.correct, s.total)),
            Cell::new(format!("{}/{}", s.points_earned, s.points_possible)),
            Cell::new(format!("{:.1}%", s.correct_percentage())),
        ]);
    }
    println!("\n{table}");

    let missed: Vec<String> = result
        .missed_questions()
        .iter()
        .map(|q| q.to_string())
        .collect();
    if !missed.is_empty() {
        println!("\nMissed: {}", missed.join(", "));
    }

    println!("\nRecommendations:");
    for rec in result.recommendations() {
        println!("  - {rec}");
    }
}
