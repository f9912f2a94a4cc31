//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use asset_curator::{
    config::CuratorConfig,
    curator::Curator,
    handler::{
        AssetContext, AssetHeader, AssetTypeHandler, HandlerRegistry, ManifestHandler,
        ThumbnailData, TransformOutput, TransformRequest,
    },
    properties::{AssetId, AssetTypeFlags},
    CuratorError,
};
use filetime::{set_file_mtime, FileTime};
use std::{
    fs::{create_dir_all, metadata, write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times, subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A temporary project with one data directory named `Assets`.
#[allow(dead_code)]
pub struct TestProject {
    pub tmp: TempDir,
    pub data_dir: PathBuf,
}

#[allow(dead_code)]
impl TestProject {
    pub fn new() -> Self {
        init_logging();
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().join("Assets");
        create_dir_all(&data_dir).unwrap();
        let data_dir = data_dir.canonicalize().unwrap();
        TestProject { tmp, data_dir }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.data_dir.join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            create_dir_all(parent).unwrap();
        }
        write(&path, content).unwrap();
        path
    }

    /// Writes a TOML asset descriptor understood by [`ManifestHandler`].
    pub fn write_manifest(
        &self,
        rel: &str,
        id: Option<AssetId>,
        dependencies: &[&str],
        references: &[&str],
    ) -> PathBuf {
        self.write(rel, &manifest(id, dependencies, references, &[]))
    }

    /// Configuration without background workers, auto transform or scan cache. Tests opt in to
    /// whatever they exercise.
    pub fn config(&self) -> CuratorConfig {
        CuratorConfig::new(&[&self.data_dir])
            .with_worker_count(0)
            .with_auto_transform(false)
            .with_cache(false)
    }

    pub fn curator(&self, config: CuratorConfig) -> Curator {
        let curator = Curator::new(config, HandlerRegistry::create()).unwrap();
        curator.initialize().unwrap();
        curator
    }
}

#[allow(dead_code)]
pub fn manifest(
    id: Option<AssetId>,
    dependencies: &[&str],
    references: &[&str],
    sub_assets: &[&str],
) -> String {
    let list = |items: &[&str]| {
        items
            .iter()
            .map(|item| format!("\"{item}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut out = String::new();
    if let Some(id) = id {
        out.push_str(&format!("id = \"{id}\"\n"));
    }
    out.push_str(&format!("dependencies = [{}]\n", list(dependencies)));
    out.push_str(&format!("references = [{}]\n", list(references)));
    out.push_str(&format!("sub_assets = [{}]\n", list(sub_assets)));
    out
}

/// Moves the modification time of `path` forward without touching its content.
#[allow(dead_code)]
pub fn bump_mtime(path: &Path) {
    let modified = metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or_else(|_| SystemTime::now());
    let later = modified + Duration::from_secs(5);
    set_file_mtime(path, FileTime::from_system_time(later)).unwrap();
}

/// [`ManifestHandler`] wrapper that counts how often source files were parsed and transformed.
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingHandler {
    inner: ManifestHandler,
    pub parses: AtomicUsize,
    pub transforms: AtomicUsize,
}

#[allow(dead_code)]
impl CountingHandler {
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }

    pub fn transform_count(&self) -> usize {
        self.transforms.load(Ordering::SeqCst)
    }

    pub fn registry(self: &Arc<Self>) -> HandlerRegistry {
        let registry = HandlerRegistry::empty();
        registry.register(self.clone());
        registry
    }
}

impl AssetTypeHandler for CountingHandler {
    fn type_name(&self) -> &str {
        self.inner.type_name()
    }

    fn extensions(&self) -> Vec<String> {
        self.inner.extensions()
    }

    fn flags(&self) -> AssetTypeFlags {
        self.inner.flags()
    }

    fn parse_header(&self, path: &Path, relative_path: &str) -> Result<AssetHeader, CuratorError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        self.inner.parse_header(path, relative_path)
    }

    fn recorded_output_hash(&self, ctx: &AssetContext<'_>) -> Option<u64> {
        self.inner.recorded_output_hash(ctx)
    }

    fn recorded_thumbnail_hash(&self, ctx: &AssetContext<'_>) -> Option<u64> {
        self.inner.recorded_thumbnail_hash(ctx)
    }

    fn transform(&self, request: &TransformRequest<'_>) -> Result<TransformOutput, CuratorError> {
        self.transforms.fetch_add(1, Ordering::SeqCst);
        self.inner.transform(request)
    }

    fn generate_thumbnail(
        &self,
        request: &TransformRequest<'_>,
    ) -> Result<ThumbnailData, CuratorError> {
        self.inner.generate_thumbnail(request)
    }
}
