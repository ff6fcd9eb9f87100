use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use file_analytics::ingestion::detect;
use file_analytics::normalize::normalize;

fn csv_input(rows: usize) -> Vec<u8> {
    let mut out = String::from("id,region,amount,units,active,day\n");
    for i in 0..rows {
        out.push_str(&format!(
            "{i},region-{},{}.25,{},{},2024-01-{:02}\n",
            i % 7,
            i * 3,
            i % 11,
            i % 2 == 0,
            i % 28 + 1
        ));
    }
    out.into_bytes()
}

fn json_input(rows: usize) -> Vec<u8> {
    let records: Vec<serde_json::Value> = (0..rows)
        .map(|i| {
            serde_json::json!({
                "id": i,
                "region": format!("region-{}", i % 7),
                "amount": i as f64 * 1.5,
                "meta": { "batch": i / 100 },
            })
        })
        .collect();
    serde_json::to_vec(&records).unwrap_or_default()
}

fn bench_detect_and_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_normalize");
    for rows in [1_000usize, 10_000] {
        let csv = csv_input(rows);
        group.throughput(Throughput::Bytes(csv.len() as u64));
        group.bench_with_input(BenchmarkId::new("csv", rows), &csv, |b, input| {
            b.iter(|| {
                let (_, ds) = detect(black_box(input), ".csv").unwrap();
                normalize(&ds).unwrap()
            })
        });

        let json = json_input(rows);
        group.throughput(Throughput::Bytes(json.len() as u64));
        group.bench_with_input(BenchmarkId::new("json", rows), &json, |b, input| {
            b.iter(|| {
                let (_, ds) = detect(black_box(input), ".json").unwrap();
                normalize(&ds).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_detect_and_normalize);
criterion_main!(benches);
