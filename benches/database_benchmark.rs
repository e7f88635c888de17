use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use laura_db::core::config::Config;
use laura_db::core::database::Database;
use laura_db::core::value::{Document, Value};
use laura_db::index::secondary::SecondaryIndex;
use laura_db::query::executor::QueryOptions;
use laura_db::query::filter::Filter;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn create_test_document(id: u64, content_size: usize) -> Document {
    let mut rng = rand::thread_rng();
    let content: String = (0..content_size)
        .map(|_| {
            let words = ["the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog"];
            words[rng.gen_range(0..words.len())]
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut doc = Document::new();
    doc.set("_id", Value::Str(format!("doc{id}")));
    doc.set("title", Value::Str(format!("Document {id}")));
    doc.set("content", Value::Str(content));
    doc.set("category", Value::Str(format!("category_{}", id % 10)));
    doc.set("score", Value::F64(rng.gen_range(0.0..100.0)));
    doc
}

fn open_bench_db() -> (tempfile::TempDir, Database) {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.storage_path = dir.path().to_path_buf();
    let db = Database::open(config).unwrap();
    db.register_index(SecondaryIndex::new("category_idx", vec!["category".into()], false));
    db.register_index(SecondaryIndex::new("score_idx", vec!["score".into()], false));
    db.register_text_field("content");
    (dir, db)
}

fn bench_single_insert(c: &mut Criterion) {
    let (_dir, db) = open_bench_db();
    let mut id = 0;
    c.bench_function("single_document_insert", |b| {
        b.iter(|| {
            db.insert(create_test_document(id, 100)).unwrap();
            id += 1;
        });
    });
}

fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");

    for batch_size in [10, 50, 100, 500, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &batch_size| {
            let (_dir, db) = open_bench_db();
            let mut id_counter = 0u64;

            b.iter(|| {
                for _ in 0..batch_size {
                    db.insert(create_test_document(id_counter, 100)).unwrap();
                    id_counter += 1;
                }
                db.flush().unwrap();
            });
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let (_dir, db) = open_bench_db();
    for i in 0..5000u64 {
        db.insert(create_test_document(i, 50)).unwrap();
    }
    db.flush().unwrap();

    let mut group = c.benchmark_group("query");

    group.bench_function("index_exact_category", |b| {
        let filter = Filter::parse(&serde_json::json!({"category": "category_5"})).unwrap();
        b.iter(|| {
            let _ = black_box(db.find(&filter, None, &QueryOptions::default()).unwrap());
        });
    });

    group.bench_function("index_range_score", |b| {
        let filter = Filter::parse(&serde_json::json!({"score": {"$gte": 25.0, "$lte": 75.0}})).unwrap();
        b.iter(|| {
            let _ = black_box(db.find(&filter, None, &QueryOptions::default()).unwrap());
        });
    });

    group.bench_function("collection_scan_content", |b| {
        let filter = Filter::parse(&serde_json::json!({"content": {"$regex": "fox"}})).unwrap();
        b.iter(|| {
            let _ = black_box(db.find(&filter, None, &QueryOptions::default()).unwrap());
        });
    });

    group.finish();
}

fn bench_full_text_search(c: &mut Criterion) {
    let (_dir, db) = open_bench_db();
    for i in 0..1000u64 {
        db.insert(create_test_document(i, 100)).unwrap();
    }
    db.flush().unwrap();

    let mut group = c.benchmark_group("full_text_search");

    group.bench_function("single_term", |b| {
        b.iter(|| {
            let _ = black_box(db.search_text("fox"));
        });
    });

    group.bench_function("multi_term", |b| {
        b.iter(|| {
            let _ = black_box(db.search_text("quick brown fox"));
        });
    });

    group.finish();
}

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("index_throughput", |b| {
        b.iter_custom(|iters| {
            let (_dir, db) = open_bench_db();
            let mut id = 0u64;

            let start = Instant::now();
            for _ in 0..iters {
                for _ in 0..100 {
                    db.insert(create_test_document(id, 100)).unwrap();
                    id += 1;
                }
                if id % 1000 == 0 {
                    db.flush().unwrap();
                }
            }
            db.flush().unwrap();
            start.elapsed()
        });
    });

    group.bench_function("query_throughput", |b| {
        let (_dir, db) = open_bench_db();
        for i in 0..5000u64 {
            db.insert(create_test_document(i, 50)).unwrap();
        }
        db.flush().unwrap();
        let db = Arc::new(db);

        let filters = vec![
            Filter::parse(&serde_json::json!({"category": "category_5"})).unwrap(),
            Filter::parse(&serde_json::json!({"score": {"$gte": 10.0, "$lte": 90.0}})).unwrap(),
        ];
        let mut idx = 0;

        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                for _ in 0..100 {
                    let _ = db.find(&filters[idx % filters.len()], None, &QueryOptions::default()).unwrap();
                    idx += 1;
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_single_insert, bench_batch_insert, bench_query, bench_full_text_search, bench_throughput);
criterion_main!(benches);
