//! The `gsat score` command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use gsatprep_core::model::{AnswerKey, AnswerValue, QuestionId, SubmittedAnswer};
use gsatprep_core::scoring::{self, ScoringResult};

use super::{key_path, load_config, load_key, print_result};
use crate::{Format, KeyArgs};

pub fn execute(
    key: KeyArgs,
    answers_path: PathBuf,
    format: Format,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let key = load_key(&key_path(&config, &key)?)?;
    let result = score_file(&key, &answers_path)?;
    print_result(&result, key.year().as_str(), format)
}

/// Score an answers file, which is either an object of question → answer
/// (the shape of a saved snapshot's `answers`) or a list of submitted
/// answers in capture order.
fn score_file(key: &AnswerKey, path: &Path) -> Result<ScoringResult> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answers: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse answers: {}", path.display()))?;

    let (result, ignored) = match value {
        serde_json::Value::Array(_) => {
            let list: Vec<SubmittedAnswer> = serde_json::from_value(value)
                .with_context(|| format!("invalid answer list in {}", path.display()))?;
            let ignored = list.iter().filter(|a| !key.contains(a.question)).count();
            (scoring::score(key, &list), ignored)
        }
        serde_json::Value::Object(_) => {
            let raw: BTreeMap<String, AnswerValue> = serde_json::from_value(value)
                .with_context(|| format!("invalid answer map in {}", path.display()))?;
            let map = raw
                .into_iter()
                .map(|(q, v)| {
                    let q: QuestionId = q
                        .trim()
                        .parse()
                        .with_context(|| format!("'{q}' is not a question number"))?;
                    Ok((q, v))
                })
                .collect::<Result<BTreeMap<_, _>>>()?;
            let ignored = map.keys().filter(|q| !key.contains(**q)).count();
            (scoring::score_values(key, &map), ignored)
        }
        _ => anyhow::bail!(
            "{}: expected a JSON object or array of answers",
            path.display()
        ),
    };

    if ignored > 0 {
        tracing::warn!(ignored, "answers for questions outside exam {} were ignored", key.year());
    }
    Ok(result)
}
