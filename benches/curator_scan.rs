//! Performance benchmarks for scanning and state computation
//!
//! Measures:
//! - Initial scan of a generated project (hashing, header parsing, classification)
//! - Re-check of an unchanged project (timestamp fast path)
//! - State computation for every asset of a dependency chain
//!
//! Run with: cargo bench

use asset_curator::{
    config::CuratorConfig,
    curator::Curator,
    handler::HandlerRegistry,
    properties::{AssetId, TransformState},
};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::{
    fs::{create_dir_all, write},
    path::{Path, PathBuf},
};
use tempfile::TempDir;

const ASSETS: usize = 200;

/// Every manifest depends on one texture and on the previous manifest in its group of ten.
fn generate_project() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("Assets");
    create_dir_all(data.join("textures")).unwrap();
    create_dir_all(data.join("meshes")).unwrap();
    for i in 0..ASSETS {
        write(
            data.join(format!("textures/t{i}.png")),
            format!("texture {i}").repeat(64),
        )
        .unwrap();
        let previous = if i % 10 == 0 {
            String::new()
        } else {
            format!(", \"meshes/m{}.asset\"", i - 1)
        };
        write(
            data.join(format!("meshes/m{i}.asset")),
            format!("dependencies = [\"textures/t{i}.png\"{previous}]\nsub_assets = [\"LOD0\"]\n"),
        )
        .unwrap();
    }
    (tmp, data)
}

fn config(data: &Path) -> CuratorConfig {
    CuratorConfig::new(&[data])
        .with_worker_count(0)
        .with_auto_transform(false)
        .with_cache(false)
}

fn bench_initial_scan(c: &mut Criterion) {
    let (_tmp, data) = generate_project();
    c.bench_function("initial_scan", |b| {
        b.iter_batched(
            || Curator::new(config(&data), HandlerRegistry::create()).unwrap(),
            |curator| {
                curator.initialize().unwrap();
                curator
            },
            BatchSize::PerIteration,
        );
    });
}

fn bench_unchanged_check(c: &mut Criterion) {
    let (_tmp, data) = generate_project();
    let curator = Curator::new(config(&data), HandlerRegistry::create()).unwrap();
    curator.initialize().unwrap();
    c.bench_function("check_unchanged_project", |b| {
        b.iter(|| {
            let changes = curator.check_file_system().unwrap();
            assert_eq!(changes, 0);
        });
    });
}

fn bench_state_computation(c: &mut Criterion) {
    let (_tmp, data) = generate_project();
    let curator = Curator::new(config(&data), HandlerRegistry::create()).unwrap();
    curator.initialize().unwrap();
    let ids: Vec<AssetId> = curator.read_index().asset_ids();
    c.bench_function("update_all_states", |b| {
        b.iter(|| {
            for id in ids.iter() {
                let state = curator.update_transform_state(*id, true).unwrap();
                assert_eq!(state, TransformState::NeedsTransform);
            }
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(20);
    targets = bench_initial_scan, bench_unchanged_check, bench_state_computation
}

criterion_main!(benches);
