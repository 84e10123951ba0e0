use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use subscriber_etl::canonical::{normalize_keys, project, RawRecord, CANONICAL_FIELDS};
use subscriber_etl::pipeline::prepare_records;

fn source_records(n: usize) -> Vec<RawRecord> {
    (0..n)
        .map(|i| {
            let mut record = RawRecord::new();
            for (j, field) in CANONICAL_FIELDS.iter().enumerate() {
                let key = if j % 2 == 0 { field.to_lowercase() } else { field.to_string() };
                let value = match j % 5 {
                    0 => json!(i),
                    1 => Value::String("NaN".to_string()),
                    2 => Value::Null,
                    _ => Value::String(format!("{field}-{i}")),
                };
                record.insert(key, value);
            }
            record.insert("extra_field".to_string(), json!(true));
            record
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let records = source_records(1_000);

    c.bench_function("normalize_keys + project (1k records)", |b| {
        b.iter(|| {
            for r in &records {
                black_box(project(&normalize_keys(black_box(r))));
            }
        })
    });

    c.bench_function("prepare_records (1k records)", |b| {
        b.iter(|| black_box(prepare_records(black_box(&records))))
    });
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
