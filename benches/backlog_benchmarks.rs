// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for the VeriSimDB replication backlog

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use verisim_backlog::{
    BacklogConfig, BinaryCodec, BufferedLog, JsonCodec, MemoryMedium, Record, RecordCodec,
    TableTier,
};

fn memory_log(capacity: u64) -> BufferedLog<TableTier<MemoryMedium>> {
    let config = BacklogConfig::with_capacity(capacity);
    let tier = TableTier::in_memory(&config).unwrap();
    BufferedLog::new(tier, config).unwrap()
}

fn payload_record(key: u64, size: usize) -> Record {
    Record::new(key, "write", vec![0x5a; size])
}

// ============================================================================
// Codec Benchmarks
// ============================================================================

fn bench_codecs(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for size in [64usize, 1024, 16 * 1024] {
        let record = payload_record(1, size);
        group.throughput(Throughput::Bytes(size as u64));

        let codecs: [(&str, &dyn RecordCodec); 2] = [("binary", &BinaryCodec), ("json", &JsonCodec)];
        for (name, codec) in codecs {
            let encoded = codec.serialize(&record).unwrap();
            group.bench_with_input(BenchmarkId::new(format!("{name}_serialize"), size), &record, |b, record| {
                b.iter(|| black_box(codec.serialize(record).unwrap()))
            });
            group.bench_with_input(BenchmarkId::new(format!("{name}_deserialize"), size), &encoded, |b, bytes| {
                b.iter(|| black_box(codec.deserialize(bytes).unwrap()))
            });
        }
    }

    group.finish();
}

// ============================================================================
// Append / Flush Benchmarks
// ============================================================================

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for capacity in [4 * 1024u64, 64 * 1024] {
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::new("memory_1000x256B", capacity), &capacity, |b, &capacity| {
            b.iter(|| {
                let mut log = memory_log(capacity);
                for key in 1..=1000 {
                    log.append(payload_record(key, 256)).unwrap();
                }
                black_box(log.size())
            });
        });
    }

    group.bench_function("redb_1000x256B", |b| {
        let dir = std::env::temp_dir().join(format!("backlog-bench-{}", uuid::Uuid::new_v4()));
        let config = BacklogConfig::with_capacity(16 * 1024);
        b.iter(|| {
            let path = dir.join(format!("{}.redb", uuid::Uuid::new_v4()));
            let tier = TableTier::redb(&path, &config).unwrap();
            let mut log = BufferedLog::new(tier, config.clone()).unwrap();
            for key in 1..=1000 {
                log.append(payload_record(key, 256)).unwrap();
            }
            log.flush_buffer().unwrap();
            black_box(log.size())
        });
        std::fs::remove_dir_all(&dir).ok();
    });

    group.finish();
}

// ============================================================================
// Removal Benchmarks
// ============================================================================

fn bench_remove_first_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_first_batch");

    for batch in [16u64, 256] {
        group.bench_with_input(BenchmarkId::new("drain_10000", batch), &batch, |b, &batch| {
            b.iter(|| {
                let mut log = memory_log(8 * 1024);
                for key in 1..=10_000 {
                    log.append(payload_record(key, 32)).unwrap();
                }
                while !log.is_empty() {
                    black_box(log.remove_first_batch(batch, u64::MAX).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let mut log = memory_log(8 * 1024);
    for key in 1..=10_000 {
        log.append(payload_record(key, 32)).unwrap();
    }

    c.bench_function("iterate_10000", |b| {
        b.iter(|| black_box(log.read_only_iterator(0).count()))
    });
}

criterion_group!(codec_benches, bench_codecs);

criterion_group!(
    log_benches,
    bench_append,
    bench_remove_first_batch,
    bench_iterate
);

criterion_main!(codec_benches, log_benches);
