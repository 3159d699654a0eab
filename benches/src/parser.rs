use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pine2ts_benches::SCRIPTS;
use pine_lexer::Lexer;
use pine_parser::Parser;

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    for (name, source) in SCRIPTS {
        let (tokens, _) = Lexer::new(source).tokenize();

        group.bench_with_input(BenchmarkId::new("parse", name), &tokens, |b, tokens| {
            b.iter(|| {
                let mut parser = Parser::new(black_box(tokens.clone()));
                let _ = parser.parse();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parser);
criterion_main!(benches);
