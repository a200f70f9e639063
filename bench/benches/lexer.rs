use criterion::{criterion_group, criterion_main, Criterion};
use kaleido::lexer::Lexer;
use std::hint::black_box;

static INPUT: &str = include_str!("../inputs/big.kal");

fn lexer(input: &str) {
    let mut lexer = Lexer::new(input);
    let mut i = 0;
    while let Some(token) = lexer.next_token().expect("input lexes cleanly") {
        black_box(token);
        i += 1;
    }
    black_box(i);
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("lexer", |b| {
        b.iter(|| {
            black_box(lexer(black_box(INPUT)));
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
