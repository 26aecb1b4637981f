use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gsatprep_core::model::{
    AnswerKey, AnswerValue, ExamYear, ExpectedAnswer, KeyEntry, Section, SubmittedAnswer,
};
use gsatprep_core::scoring::{score, score_values};

const LETTERS: [&str; 4] = ["A", "B", "C", "D"];

fn make_key() -> AnswerKey {
    let mut entries = Vec::new();
    for q in 1..=49u32 {
        let (expected, section, points) = match q {
            1..=10 => (ExpectedAnswer::choice(LETTERS[q as usize % 4]), Section::Vocabulary, 1),
            11..=20 => (ExpectedAnswer::choice(LETTERS[q as usize % 4]), Section::Cloze, 1),
            21..=30 => (ExpectedAnswer::choice(LETTERS[q as usize % 4]), Section::FillIn, 1),
            31..=34 => (ExpectedAnswer::choice(LETTERS[q as usize % 4]), Section::Structure, 2),
            35..=46 => (ExpectedAnswer::choice(LETTERS[q as usize % 4]), Section::Reading, 2),
            47 => (ExpectedAnswer::fill_in("participating", vec![]), Section::Mixed, 2),
            48 => (
                ExpectedAnswer::fill_in("asylum", vec!["refuge".into()]),
                Section::Mixed,
                2,
            ),
            _ => (ExpectedAnswer::multi(["C", "D"]), Section::Mixed, 2),
        };
        entries.push(KeyEntry {
            question: q,
            expected,
            section,
            points,
        });
    }
    AnswerKey::new(ExamYear::new("111").unwrap(), 68, entries).unwrap()
}

fn make_answers(correct_every: usize) -> Vec<SubmittedAnswer> {
    (1..=49u32)
        .map(|q| {
            let value = match q {
                47 => AnswerValue::text(" Participating "),
                48 => AnswerValue::text("REFUGE"),
                49 => AnswerValue::set(["D", "C"]),
                _ if q as usize % correct_every == 0 => AnswerValue::text(LETTERS[q as usize % 4]),
                _ => AnswerValue::text("E"),
            };
            SubmittedAnswer::new(q, value, q as i64)
        })
        .collect()
}

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");
    let key = make_key();

    group.bench_function("all_correct", |b| {
        let answers = make_answers(1);
        b.iter(|| score(black_box(&key), black_box(&answers)))
    });

    group.bench_function("half_correct", |b| {
        let answers = make_answers(2);
        b.iter(|| score(black_box(&key), black_box(&answers)))
    });

    group.bench_function("empty", |b| {
        let answers: Vec<SubmittedAnswer> = Vec::new();
        b.iter(|| score(black_box(&key), black_box(&answers)))
    });

    group.bench_function("snapshot_map", |b| {
        let answers: BTreeMap<u32, AnswerValue> = make_answers(3)
            .into_iter()
            .map(|a| (a.question, a.value))
            .collect();
        b.iter(|| score_values(black_box(&key), black_box(&answers)))
    });

    group.finish();
}

criterion_group!(benches, bench_score);
criterion_main!(benches);
