use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use nimbus::dataset::Step;
use nimbus::metadata::time::{parse_instant, TimeInterval};
use nimbus::metadata::types::{CodeStyle, CodeTriple, Value};
use nimbus::{DatasetConfig, Flavor, Format, Metadata, Writer};
use tempfile::tempdir;

const PAYLOAD: &[u8] = &[0x42; 4096];

fn bench_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire");
    group.throughput(Throughput::Bytes(PAYLOAD.len() as u64));
    group.bench_function("concat_4k", |b| {
        let dir = tempdir().unwrap();
        let mut config = DatasetConfig::new("bench", dir.path(), Format::Grib);
        config.step = Step::Monthly;
        config.flavor = Flavor::Concat;
        let mut writer = Writer::open(config).unwrap();
        let base = parse_instant("2020-01-01 00:00:00").unwrap();
        let mut seq = 0u32;
        b.iter(|| {
            // Vary product code so the uniqueness policy never rejects.
            seq = seq.wrapping_add(1);
            let mut md = Metadata::new()
                .with(Value::Reftime(TimeInterval::instant(base)))
                .with(Value::Product(CodeTriple::new(
                    CodeStyle::Grib1,
                    [Some(seq), None, None],
                )));
            writer.acquire(&mut md, PAYLOAD).unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_acquire);
criterion_main!(benches);
