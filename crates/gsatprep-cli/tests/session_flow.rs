//! End-to-end session tests: answers persist between invocations, submit
//! moves the attempt into history, and misuse is reported.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gsat(home: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("gsat").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("GSAT_STORE_DIR", home.path().join("store"))
        .env_remove("RUST_LOG");
    cmd
}

fn key(year: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(format!("../../keys/{year}.toml"))
}

fn session(home: &TempDir, year: &str, args: &[&str]) -> Command {
    let mut cmd = gsat(home);
    cmd.arg("session").arg(args[0]).arg("--key").arg(key(year));
    cmd.args(&args[1..]);
    cmd
}

#[test]
fn answers_survive_between_runs_and_submit_records_history() {
    let home = TempDir::new().unwrap();

    session(&home, "114", &["answer", "1", "C"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Question 1: C"));
    session(&home, "114", &["answer", "31", "D"]).assert().success();
    session(&home, "114", &["answer", "2", "A"]).assert().success();
    session(&home, "114", &["bookmark", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bookmarked question 5"));

    assert!(home.path().join("store/gsat_exam_114_progress.json").exists());

    session(&home, "114", &["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("InProgress"))
        .stdout(predicate::str::contains("3/46"));

    gsat(&home)
        .args(["progress", "show", "--year", "114"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 answered, 1 bookmarked"));

    session(&home, "114", &["submit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exam 114: 4/62"));

    // Progress is gone once submitted, and a new session starts fresh.
    gsat(&home)
        .args(["progress", "show", "--year", "114"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved progress for exam 114."));
    session(&home, "114", &["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NotStarted"))
        .stdout(predicate::str::contains("0/46"));

    gsat(&home)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("114"))
        .stdout(predicate::str::contains("Exams taken:    1"))
        .stdout(predicate::str::contains("Recent attempts:"))
        .stdout(predicate::str::contains("exam 114"));

    let output = gsat(&home)
        .args(["history", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["profile"]["exams_taken"], 1);
    assert_eq!(report["years"]["114"]["attempts"], 1);
    assert_eq!(report["records"][0]["pointsEarned"], 4);
    assert_eq!(report["records"][0]["bookmarkedQuestions"], 1);
    assert_eq!(report["recent"][0]["year"], "114");
}

#[test]
fn multi_select_and_fill_in_answers() {
    let home = TempDir::new().unwrap();

    session(&home, "111", &["answer", "49", "D", "C"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Question 49: C, D"));
    session(&home, "111", &["answer", "47", "Participating"]).assert().success();
    session(&home, "111", &["answer", "48", "asylum"]).assert().success();

    session(&home, "111", &["submit", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_points_earned\": 6"));
}

#[test]
fn answer_without_value_clears_question() {
    let home = TempDir::new().unwrap();

    session(&home, "114", &["answer", "3", "A"]).assert().success();
    session(&home, "114", &["answer", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared question 3"));

    gsat(&home)
        .args(["progress", "show", "--year", "114"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 answered"));
}

#[test]
fn unknown_question_is_an_error() {
    let home = TempDir::new().unwrap();

    session(&home, "114", &["answer", "99", "A"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("question 99 is not part of exam 114"));
}

#[test]
fn reset_discards_progress() {
    let home = TempDir::new().unwrap();

    session(&home, "114", &["answer", "1", "C"]).assert().success();
    session(&home, "114", &["reset"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Progress for exam 114 reset."));

    gsat(&home)
        .args(["progress", "show", "--year", "114"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved progress"));
}

#[test]
fn progress_clear_is_idempotent() {
    let home = TempDir::new().unwrap();

    session(&home, "114", &["answer", "1", "C"]).assert().success();
    for _ in 0..2 {
        gsat(&home)
            .args(["progress", "clear", "--year", "114"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cleared saved progress for exam 114."));
    }
}

#[test]
fn corrupt_progress_is_ignored() {
    let home = TempDir::new().unwrap();
    let store = home.path().join("store");
    std::fs::create_dir_all(&store).unwrap();
    std::fs::write(store.join("gsat_exam_114_progress.json"), "{not json").unwrap();

    gsat(&home)
        .args(["progress", "show", "--year", "114"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved progress"));

    session(&home, "114", &["answer", "1", "C"]).assert().success();
    gsat(&home)
        .args(["progress", "show", "--year", "114"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 answered"));
}

#[test]
fn empty_history() {
    let home = TempDir::new().unwrap();
    gsat(&home)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No completed exams yet."));
}

#[test]
fn second_submit_without_progress_is_refused() {
    let home = TempDir::new().unwrap();

    session(&home, "114", &["answer", "1", "C"]).assert().success();
    session(&home, "114", &["submit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exam 114: 4/62"));
    session(&home, "114", &["submit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to submit for exam 114"));

    let output = gsat(&home)
        .args(["history", "--format", "json"])
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["profile"]["exams_taken"], 1);
}

#[test]
fn allow_empty_submits_a_blank_sheet() {
    let home = TempDir::new().unwrap();

    session(&home, "114", &["submit", "--allow-empty"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exam 114: 0/62"));
    gsat(&home)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exams taken:    1"));
}

#[test]
fn status_reports_pace_once_answered() {
    let home = TempDir::new().unwrap();

    session(&home, "114", &["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pace per question").not());
    session(&home, "114", &["answer", "1", "C"]).assert().success();
    session(&home, "114", &["answer", "2", "A"]).assert().success();
    session(&home, "114", &["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pace per question: median"));
}

#[test]
fn year_resolves_against_configured_keys_dir() {
    let home = TempDir::new().unwrap();
    let keys = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../keys");
    std::fs::write(
        home.path().join("gsat.toml"),
        format!("keys_dir = '{}'\n", keys.display()),
    )
    .unwrap();

    gsat(&home)
        .args(["session", "answer", "--year", "114", "1", "C"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Question 1: C"));
    gsat(&home)
        .args(["session", "submit", "--year", "114"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exam 114: 4/62"));
    gsat(&home)
        .args(["session", "status", "--year", "../114"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --year '../114'"));
}
