//! The `gsat session` commands.
//!
//! Every invocation reopens the session from the store, so a session can be
//! worked through over many runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use comfy_table::{Cell, Table};

use gsatprep_core::history::ResultHistory;
use gsatprep_core::model::AnswerValue;
use gsatprep_core::progress::{ProgressStore, WriteOutcome};
use gsatprep_core::session::{ExamSession, SessionState};
use gsatprep_core::telemetry::{NoopSink, TelemetrySink};
use gsatprep_core::traits::{Clock, SystemClock};
use gsatprep_sync::config::{create_sink, GsatConfig};

use super::{key_path, load_config, load_key, open_store, print_result};
use crate::{KeyArgs, SessionAction};

const TELEMETRY_DRAIN: Duration = Duration::from_secs(5);

pub async fn execute(action: SessionAction, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;

    match action {
        SessionAction::Answer {
            key,
            question,
            values,
        } => {
            let mut session = open(&config, &key)?;
            let value = match values.len() {
                0 => AnswerValue::text(""),
                1 => AnswerValue::text(values[0].clone()),
                _ => AnswerValue::set(values),
            };
            let shown = value.to_string();
            let outcome = session.answer(question, value)?;
            report_write(&outcome);
            if shown.is_empty() {
                println!("Cleared question {question}");
            } else {
                println!("Question {question}: {shown}");
            }
        }
        SessionAction::Bookmark { key, question } => {
            let mut session = open(&config, &key)?;
            let outcome = session.toggle_bookmark(question)?;
            report_write(&outcome);
            if session.snapshot().bookmarks.contains(&question) {
                println!("Bookmarked question {question}");
            } else {
                println!("Removed bookmark on question {question}");
            }
        }
        SessionAction::Submit {
            key,
            allow_empty,
            format,
        } => {
            let session = open(&config, &key)?;
            if session.state() == SessionState::NotStarted && !allow_empty {
                bail!(
                    "nothing to submit for exam {}: no saved progress (already submitted?); \
                     answer a question first or pass --allow-empty",
                    session.key().year()
                );
            }

            let sink = create_sink(&config.telemetry, open_store(&config))?;
            let telemetry: Arc<dyn TelemetrySink> = match &sink {
                Some(s) => Arc::clone(s) as Arc<dyn TelemetrySink>,
                None => Arc::new(NoopSink),
            };

            let mut session = session
                .with_telemetry(telemetry)
                .with_history(ResultHistory::new(open_store(&config)));
            let submission = session.submit()?;
            report_write(&submission.cleared);
            if let Some(recorded) = &submission.recorded {
                report_write(recorded);
            }

            print_result(&submission.result, session.key().year().as_str(), format)?;

            if let Some(sink) = sink {
                sink.drain(TELEMETRY_DRAIN).await;
            }
        }
        SessionAction::Reset { key } => {
            let mut session = open(&config, &key)?;
            let outcome = session.reset()?;
            report_write(&outcome);
            println!("Progress for exam {} reset.", session.key().year());
        }
        SessionAction::Status { key } => {
            let session = open(&config, &key)?;
            print_status(&session, SystemClock.now_ms());
        }
    }

    Ok(())
}

fn open(config: &GsatConfig, args: &KeyArgs) -> Result<ExamSession> {
    let key = Arc::new(load_key(&key_path(config, args)?)?);
    let store = ProgressStore::new(open_store(config));
    Ok(ExamSession::open(key, store, Arc::new(SystemClock)))
}

/// Storage problems never stop the command; surface them as warnings.
fn report_write(outcome: &WriteOutcome) {
    match outcome {
        WriteOutcome::Written => {}
        WriteOutcome::Stale {
            persisted_last_saved,
        } => eprintln!(
            "Warning: a newer save already exists (saved at {persisted_last_saved}); this change was not stored."
        ),
        WriteOutcome::Failed(e) => eprintln!("Warning: progress could not be saved: {e}"),
    }
}

fn print_status(session: &ExamSession, now: i64) {
    let report = session.progress(now);
    let snapshot = session.snapshot();

    println!(
        "Exam {} ({:?}), session {}",
        session.key().year(),
        session.state(),
        session.session_id()
    );

    let mut table = Table::new();
    table.set_header(vec![
        "Answered",
        "Complete",
        "Bookmarked",
        "Elapsed",
        "Remaining",
        "Avg / question",
        "Est. to finish",
    ]);
    table.add_row(vec![
        Cell::new(format!("{}/{}", report.answered, report.total)),
        Cell::new(format!("{:.0}%", report.completion * 100.0)),
        Cell::new(report.bookmarked),
        Cell::new(format!("{} min", report.elapsed.as_secs() / 60)),
        Cell::new(format!("{} min", report.remaining.as_secs() / 60)),
        Cell::new(
            report
                .average_secs_per_question
                .map(|s| format!("{s:.0}s"))
                .unwrap_or_else(|| "--".into()),
        ),
        Cell::new(
            report
                .estimated_minutes_remaining
                .map(|m| format!("{m:.0} min"))
                .unwrap_or_else(|| "--".into()),
        ),
    ]);
    println!("{table}");

    if let Some(pace) = session.time_distribution() {
        println!(
            "Pace per question: median {}s, range {}-{}s, mean {}s (sd {}s)",
            pace.median_secs, pace.min_secs, pace.max_secs, pace.average_secs, pace.std_dev_secs
        );
    }

    if !snapshot.bookmarks.is_empty() {
        let marks: Vec<String> = snapshot.bookmarks.iter().map(|q| q.to_string()).collect();
        println!("Bookmarked: {}", marks.join(", "));
    }
}
