use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Map, Value};

use fieldvault::{codec, generate_dek, EntityKind};

fn note(size: usize) -> Map<String, Value> {
    match json!({"id": "n1", "title": "Benchmark", "text": "x".repeat(size), "pinned": false}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn benchmark_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let dek = generate_dek().unwrap();
    let fields = EntityKind::Note.sensitive_fields();

    let sizes = [("100B", 100), ("1KB", 1024), ("10KB", 10 * 1024)];

    for (name, size) in sizes {
        let plain = note(size);
        let mut sealed = plain.clone();
        codec::encrypt_fields(&mut sealed, fields, &dek).unwrap();

        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encrypt_{}", name), |b| {
            b.iter(|| {
                let mut record = plain.clone();
                codec::encrypt_fields(black_box(&mut record), fields, &dek).unwrap();
                record
            })
        });

        group.bench_function(format!("decrypt_{}", name), |b| {
            b.iter(|| {
                let mut record = sealed.clone();
                codec::decrypt_fields(black_box(&mut record), fields, Some(&dek));
                record
            })
        });

        group.bench_function(format!("classify_{}", name), |b| {
            b.iter(|| codec::count_plaintext_leaves(black_box(&sealed["text"]), &dek))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_codec);
criterion_main!(benches);
