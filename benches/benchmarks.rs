//! Performance benchmarks for linex
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use linex::config::ThreadCount;
use linex::index::LineIndexBuilder;
use linex::loader::ReadSource;
use linex::query::{parse_query, TermTable};
use linex::storage::{Storage, StorageConfig, StorageKind};
use linex::{CancelToken, Config, Document, NoopObserver};
use std::io::Cursor;

/// Log-like content of roughly `lines` lines
fn sample_log(lines: usize) -> Vec<u8> {
    let levels = ["INFO", "DEBUG", "WARN", "ERROR"];
    (0..lines)
        .flat_map(|i| {
            format!(
                "2024-03-{:02} 12:{:02}:{:02} {} worker-{} request {} took {}ms\n",
                i % 28 + 1,
                i % 60,
                (i * 7) % 60,
                levels[i % levels.len()],
                i % 16,
                i,
                (i * 31) % 997
            )
            .into_bytes()
        })
        .collect()
}

fn load(data: &[u8], threads: usize) -> Document {
    let mut source = ReadSource::new(Cursor::new(data.to_vec()), Some(data.len() as u64));
    let config = Config {
        search_threads: ThreadCount::Fixed(threads),
        ..Config::default()
    };
    Document::load(&mut source, config, &NoopObserver, &CancelToken::new()).0
}

fn bench_query_parsing(c: &mut Criterion) {
    let queries = [
        "simple",
        "two words",
        "\"exact phrase\"",
        "cs:ERROR AND NOT worker-3",
        "r:took \\d{3}ms",
        "(ERROR OR WARN) AND (request NOT r:\"took [0-9]ms\")",
    ];

    let mut group = c.benchmark_group("query_parsing");
    for query in queries {
        group.bench_with_input(BenchmarkId::from_parameter(query), &query, |b, &q| {
            b.iter(|| {
                let mut table = TermTable::new();
                parse_query(black_box(q), &mut table)
            })
        });
    }
    group.finish();
}

fn bench_index_build(c: &mut Criterion) {
    let data = sample_log(200_000);
    let mut group = c.benchmark_group("index_build");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("builder_only", |b| {
        b.iter(|| {
            let mut builder = LineIndexBuilder::new(64 * 1024, 32);
            for block in data.chunks(256 * 1024) {
                builder.push(black_box(block)).unwrap();
            }
            builder.finish()
        })
    });

    for kind in [StorageKind::Memory, StorageKind::Compressed] {
        group.bench_with_input(BenchmarkId::new("storage", format!("{:?}", kind)), &kind, |b, &kind| {
            b.iter(|| {
                let storage = Storage::new(kind, &StorageConfig::default(), None);
                for block in data.chunks(256 * 1024) {
                    storage.write(black_box(block)).unwrap();
                }
                storage.finish();
                storage.drain();
                storage
            })
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let data = sample_log(200_000);
    let mut group = c.benchmark_group("search");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.sample_size(20);

    for threads in [1, 4] {
        // Every iteration uses a fresh document so terms are never computed
        group.bench_with_input(BenchmarkId::new("cold_substring", threads), &threads, |b, &threads| {
            b.iter_batched(
                || load(&data, threads),
                |mut doc| doc.search(black_box("worker-7 AND ERROR"), &NoopObserver, &CancelToken::new()),
                criterion::BatchSize::LargeInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("cold_regex", threads), &threads, |b, &threads| {
            b.iter_batched(
                || load(&data, threads),
                |mut doc| doc.search(black_box(r"r:took \d{3}ms"), &NoopObserver, &CancelToken::new()),
                criterion::BatchSize::LargeInput,
            )
        });
    }

    // Computed terms: the query is answered from the term bits
    let mut doc = load(&data, 4);
    let _ = doc.search("worker-7 ERROR", &NoopObserver, &CancelToken::new());
    group.bench_function("computed_terms", |b| {
        b.iter(|| doc.search(black_box("ERROR AND NOT worker-7"), &NoopObserver, &CancelToken::new()))
    });

    group.finish();
}

criterion_group!(benches, bench_query_parsing, bench_index_build, bench_search);

criterion_main!(benches);
