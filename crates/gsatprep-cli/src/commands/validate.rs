//! The `gsat validate` command.

use std::path::PathBuf;

use anyhow::Result;

use gsatprep_core::parser;

use super::load_config;

pub fn execute(key_path: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<()> {
    let key_path = match key_path {
        Some(path) => path,
        None => load_config(config_path.as_deref())?.keys_dir,
    };

    let keys = if key_path.is_dir() {
        parser::load_key_directory(&key_path)?
    } else {
        vec![parser::parse_exam_key(&key_path)?]
    };

    if keys.is_empty() {
        anyhow::bail!("no valid answer keys found in {}", key_path.display());
    }

    let mut total_warnings = 0;

    for key in &keys {
        let sections: Vec<&str> = key.sections().iter().map(|s| s.title()).collect();
        println!(
            "Exam {}: {} questions, max score {}, {} min ({})",
            key.year(),
            key.total_questions(),
            key.max_score(),
            key.time_limit().as_secs() / 60,
            sections.join(", ")
        );

        let warnings = parser::validate_exam_key(key);
        for w in &warnings {
            let prefix = w
                .question
                .map(|q| format!("  [q{q}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All answer keys valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
