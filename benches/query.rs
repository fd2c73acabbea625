use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nimbus::matcher::Matcher;
use nimbus::metadata::time::{parse_instant, TimeInterval};
use nimbus::metadata::types::{CodeStyle, CodeTriple, Level, Value};
use nimbus::Metadata;

fn fixture(l1: u32) -> Metadata {
    Metadata::new()
        .with(Value::Reftime(TimeInterval::instant(
            parse_instant("2020-01-15 12:00:00").unwrap(),
        )))
        .with(Value::Origin(CodeTriple::new(
            CodeStyle::Grib1,
            [Some(98), Some(0), None],
        )))
        .with(Value::Level(Level::Coded {
            ltype: 100,
            l1: Some(l1),
            l2: None,
        }))
}

fn bench_matcher(c: &mut Criterion) {
    c.bench_function("parse_expression", |b| {
        b.iter(|| {
            Matcher::parse(black_box(
                "origin:GRIB1,98; level:1000 or 2000; reftime:>=2020-01-01,<2020-02-01",
            ))
            .unwrap()
        })
    });

    c.bench_function("evaluate_record", |b| {
        let matcher = Matcher::parse(
            "origin:GRIB1,98; level:1000 or 2000; reftime:>=2020-01-01,<2020-02-01",
        )
        .unwrap();
        let records: Vec<Metadata> = (0..64).map(|i| fixture(500 + i * 100)).collect();
        b.iter(|| {
            let mut hits = 0usize;
            for md in &records {
                if matcher.matches(black_box(md)) {
                    hits += 1;
                }
            }
            hits
        })
    });
}

criterion_group!(benches, bench_matcher);
criterion_main!(benches);
