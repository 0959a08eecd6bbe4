//! Alarm store benchmarks

use alarm_notify::{AlarmRecord, AlarmStore};
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn filled_store(size: usize) -> AlarmStore {
    let store = AlarmStore::new();
    for i in 0..size {
        let time = Utc.timestamp_opt(i as i64, 0).unwrap();
        store.ingest(AlarmRecord::with_trigger_time(format!("DET:PV:{}", i), "MAJOR", "HIHI", time));
    }
    store
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("raise_and_clear", size), &size, |b, &size| {
            b.iter(|| {
                let store = filled_store(size);
                for i in 0..size {
                    store.ingest(AlarmRecord::new(format!("DET:PV:{}", i), "MAJOR_ACK", "HIHI"));
                }
                black_box(store.count());
            });
        });
    }

    group.finish();
}

fn bench_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("batches");
    let now = Utc.timestamp_opt(1_000_000, 0).unwrap();

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("desktop", size), &size, |b, &size| {
            b.iter_with_setup(
                || filled_store(size),
                |store| black_box(store.prepare_desktop_batch(now, Duration::seconds(30))),
            );
        });
        group.bench_with_input(BenchmarkId::new("email", size), &size, |b, &size| {
            b.iter_with_setup(|| filled_store(size), |store| black_box(store.prepare_email_batch()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ingest, bench_batches);
criterion_main!(benches);
