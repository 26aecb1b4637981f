use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gsatprep_core::parser::{parse_exam_key_str, validate_exam_key};

const KEY_114: &str = include_str!("../../../keys/114.toml");

fn bench_parse_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_key");
    let path = Path::new("keys/114.toml");

    group.bench_function("parse_114", |b| {
        b.iter(|| parse_exam_key_str(black_box(KEY_114), black_box(path)))
    });

    group.bench_function("validate_114", |b| {
        let key = parse_exam_key_str(KEY_114, path).unwrap();
        b.iter(|| validate_exam_key(black_box(&key)))
    });

    group.finish();
}

criterion_group!(benches, bench_parse_key);
criterion_main!(benches);
