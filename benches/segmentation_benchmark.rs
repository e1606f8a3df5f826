//! Performance benchmarks for codeindex
//!
//! **Benchmarks Included:**
//! - `segmentation`: parsing a generated class with 10, 100 and 500 methods
//! - `chunking`: splitting oversized text into overlapping windows
//! - `store_query`: cosine query over 100 and 1000 stored entries
//!
//! **Run benchmarks:**
//! ```bash
//! cargo bench                        # Run all benchmarks
//! cargo bench -- segmentation        # Segmentation only
//! ```

use std::fmt::Write as _;

use codeindex::embeddings::placeholder_embedding;
use codeindex::segment::chunking::split_windows;
use codeindex::segment::SegmentationEngine;
use codeindex::storage::{SqliteVectorStore, VectorEntry, VectorStore};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const DIMENSION: usize = 384;

/// A class with `methods` small methods and one field per ten methods.
fn generate_class(methods: usize) -> String {
    let mut source = String::from("package bench;\n\nimport java.util.List;\n\npublic class Generated {\n");
    for i in 0..methods {
        if i % 10 == 0 {
            let _ = writeln!(source, "    private int field{i};");
        }
        let _ = writeln!(
            source,
            "    public int method{i}(List<String> items) {{\n        return items.size() + {i};\n    }}\n"
        );
    }
    source.push_str("}\n");
    source
}

fn bench_segmentation(c: &mut Criterion) {
    let engine = SegmentationEngine::default();
    let mut group = c.benchmark_group("segmentation");
    group.sample_size(20);

    for methods in &[10, 100, 500] {
        let source = generate_class(*methods);
        group.bench_with_input(BenchmarkId::from_parameter(methods), &source, |b, source| {
            b.iter(|| black_box(engine.parse(source, "bench/Generated.java", None)));
        });
    }

    group.finish();
}

fn bench_chunking(c: &mut Criterion) {
    let text = "abcdefghij".repeat(5_000);
    c.bench_function("chunking/50k_chars", |b| {
        b.iter(|| black_box(split_windows(&text, 2000, 100)));
    });
}

fn bench_store_query(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("failed to build runtime");
    let mut group = c.benchmark_group("store_query");
    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(5));

    for count in &[100_usize, 1000] {
        let store = SqliteVectorStore::in_memory().expect("failed to open store");
        runtime.block_on(async {
            store.ensure_collection("bench").await.expect("collection");
            let entries: Vec<VectorEntry> = (0..*count)
                .map(|i| {
                    let document = format!("int method{i}() {{ return {i}; }}");
                    VectorEntry {
                        id: format!("bench/File{}.java:{i}:METHOD:method{i}", i % 50),
                        embedding: placeholder_embedding(&document, DIMENSION),
                        metadata: serde_json::Map::new(),
                        document,
                    }
                })
                .collect();
            store.upsert("bench", &entries).await.expect("upsert");
        });

        let query_vector = placeholder_embedding("int method7() { return 7; }", DIMENSION);
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                runtime
                    .block_on(store.query("bench", &query_vector, 10, None))
                    .expect("query failed")
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_segmentation, bench_chunking, bench_store_query);
criterion_main!(benches);
