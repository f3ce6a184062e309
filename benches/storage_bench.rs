//! Benchmarks for AtlasDB collection operations

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::json;
use tempfile::TempDir;

use atlasdb::config::{Config, SyncStrategy};
use atlasdb::schema::{FieldSchema, FieldType, Schema};
use atlasdb::Engine;

fn open_engine(temp: &TempDir) -> Engine {
    let config = Config::builder()
        .data_dir(temp.path())
        .sync_strategy(SyncStrategy::OsManaged)
        .build();
    let engine = Engine::open(config).unwrap();

    let schema = Schema::new(vec![
        FieldSchema::new("name", FieldType::String, true, true),
        FieldSchema::new("age", FieldType::Int, false, false),
    ])
    .unwrap();
    engine.create_database("bench").unwrap();
    engine.create_collection("bench", "users", schema).unwrap();
    engine
}

fn storage_benchmarks(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(&temp);

    let mut n = 0u64;
    c.bench_function("insert", |b| {
        b.iter(|| {
            n += 1;
            engine
                .insert("bench", "users", json!({ "name": format!("user-{}", n % 1000), "age": n }))
                .unwrap()
        })
    });

    c.bench_function("find_indexed", |b| {
        b.iter(|| engine.find("bench", "users", "name:user-42").unwrap())
    });

    c.bench_function("find_scan", |b| {
        b.iter(|| engine.find("bench", "users", "age:42").unwrap())
    });

    let id = engine
        .insert("bench", "users", json!({ "name": "lookup", "age": 1 }))
        .unwrap()["_id"]
        .as_str()
        .unwrap()
        .to_string();
    c.bench_function("get_cached", |b| {
        b.iter(|| engine.get_instance("bench", "users", &id).unwrap())
    });

    c.bench_function("cold_open_and_find", |b| {
        b.iter_batched(
            || Engine::open_path(temp.path()).unwrap(),
            |fresh| fresh.find("bench", "users", "name:user-7").unwrap(),
            BatchSize::PerIteration,
        )
    });
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
