use criterion::{criterion_group, criterion_main, Criterion};
use kaleido::{lexer::Lexer, parser::parse_program};
use std::hint::black_box;

static INPUT: &str = include_str!("../inputs/big.kal");

fn parser(input: &str) {
    let program = parse_program(Lexer::new(input)).expect("input parses cleanly");
    _ = black_box(program);
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("parser", |b| {
        b.iter(|| {
            black_box(parser(black_box(INPUT)));
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
