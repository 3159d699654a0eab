use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pine2ts::{transpile, TranspileOptions};
use pine2ts_benches::SCRIPTS;

fn bench_transpiler(c: &mut Criterion) {
    let mut group = c.benchmark_group("transpiler");
    let options = TranspileOptions::default();

    for (name, source) in SCRIPTS {
        group.bench_with_input(BenchmarkId::new("transpile", name), source, |b, source| {
            b.iter(|| {
                transpile(black_box(source), &options).expect("benchmark sources transpile");
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_transpiler);
criterion_main!(benches);
