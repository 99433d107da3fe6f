use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tether_script::lexer::Lexer;
use tether_script::{parse, Isolate};

const FIB: &str = r#"
    function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }
    fib(15)
"#;

const LOOP: &str = r#"
    let total = 0;
    for (let i = 0; i < 1000; i++) { total += i % 7; }
    total
"#;

const OBJECTS: &str = r#"
    const items = [];
    for (let i = 0; i < 200; i++) { items.push({ id: i, name: `item-${i}` }); }
    JSON.stringify(items.filter(x => x.id % 2 === 0).map(x => x.name)).length
"#;

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("tokenize_objects", |b| {
        b.iter(|| Lexer::new(black_box(OBJECTS)).tokenize().unwrap());
    });
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_fib", |b| {
        b.iter(|| parse(black_box(FIB)).unwrap());
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    for (name, source) in [("fib", FIB), ("loop", LOOP), ("objects", OBJECTS)] {
        group.bench_with_input(BenchmarkId::new("fresh_context", name), &source, |b, source| {
            let mut isolate = Isolate::default();
            b.iter(|| {
                let ctx = isolate.create_context().unwrap();
                let value = isolate.evaluate(ctx, black_box(source)).unwrap();
                isolate.dispose_context(ctx);
                isolate.maybe_collect();
                value
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tokenize, bench_parse, bench_evaluate);
criterion_main!(benches);
