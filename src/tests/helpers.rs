//! Shared test utilities for in-crate tests

use crate::{
    error::CuratorError,
    handler::{
        AssetContext, AssetHeader, AssetTypeHandler, SubAssetDescriptor, ThumbnailData,
        TransformOutput, TransformRequest,
    },
    hash::hash_bytes,
    properties::{AssetId, AssetTypeFlags},
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    fs::read_to_string,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// In-memory handler for `*.tst` files.
///
/// Source files are line based:
///
/// ```text
/// id 6f1c0a52-...      optional, derived from the path otherwise
/// dep textures/a.png   transform-time input
/// ref other.tst        runtime reference
/// sub LOD0             named sub-asset
/// import               source still needs an import
/// ```
///
/// Recorded hashes live in memory, so a fresh handler has never transformed anything.
#[derive(Default)]
pub struct TestHandler {
    pub flags: AssetTypeFlags,
    outputs: Mutex<HashMap<AssetId, u64>>,
    thumbnails: Mutex<HashMap<AssetId, u64>>,
    failing: Mutex<HashSet<AssetId>>,
    panicking: Mutex<HashSet<AssetId>>,
    transforms: AtomicUsize,
}

impl TestHandler {
    pub fn with_flags(flags: AssetTypeFlags) -> Self {
        TestHandler {
            flags,
            ..Default::default()
        }
    }

    pub fn fail(&self, id: AssetId, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    /// Makes the transform of `id` panic instead of returning.
    pub fn panic_on(&self, id: AssetId, panicking: bool) {
        let mut set = self.panicking.lock();
        if panicking {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    pub fn transform_count(&self) -> usize {
        self.transforms.load(Ordering::SeqCst)
    }

    pub fn record_output(&self, id: AssetId, hash: u64) {
        self.outputs.lock().insert(id, hash);
    }
}

/// Renders a `*.tst` source.
pub fn tst_source(id: Option<AssetId>, deps: &[&str], refs: &[&str], subs: &[&str]) -> String {
    let mut lines = Vec::new();
    if let Some(id) = id {
        lines.push(format!("id {id}"));
    }
    lines.extend(deps.iter().map(|d| format!("dep {d}")));
    lines.extend(refs.iter().map(|r| format!("ref {r}")));
    lines.extend(subs.iter().map(|s| format!("sub {s}")));
    lines.join("\n")
}

impl AssetTypeHandler for TestHandler {
    fn type_name(&self) -> &str {
        "Test"
    }

    fn extensions(&self) -> Vec<String> {
        vec!["tst".to_string()]
    }

    fn flags(&self) -> AssetTypeFlags {
        self.flags
    }

    fn parse_header(&self, path: &Path, relative_path: &str) -> Result<AssetHeader, CuratorError> {
        let content = read_to_string(path)?;
        let mut header = AssetHeader::new(AssetId::from_relative_path(relative_path), "Test");
        header.settings_hash = hash_bytes(content.as_bytes());
        for line in content.lines() {
            let (key, value) = line.trim().split_once(' ').unwrap_or((line.trim(), ""));
            let value = value.trim();
            match key {
                "id" => header.id = value.parse()?,
                "dep" => {
                    header.dependencies.insert(value.to_string());
                }
                "ref" => {
                    header.references.insert(value.to_string());
                }
                "sub" => header.sub_assets.push(SubAssetDescriptor {
                    id: header.id.sub_asset(value),
                    name: value.to_string(),
                    type_name: "TestPart".to_string(),
                }),
                "import" => header.needs_import = true,
                "" => {}
                other => {
                    return Err(CuratorError::Handler(format!(
                        "unknown directive {other:?} in {path:?}"
                    )))
                }
            }
        }
        Ok(header)
    }

    fn recorded_output_hash(&self, ctx: &AssetContext<'_>) -> Option<u64> {
        self.outputs.lock().get(&ctx.id).copied()
    }

    fn recorded_thumbnail_hash(&self, ctx: &AssetContext<'_>) -> Option<u64> {
        self.thumbnails.lock().get(&ctx.id).copied()
    }

    fn transform(&self, request: &TransformRequest<'_>) -> Result<TransformOutput, CuratorError> {
        let id = request.context.id;
        let panics = self.panicking.lock().contains(&id);
        if panics {
            panic!("{} crashed the handler", request.context.relative_path);
        }
        if self.failing.lock().contains(&id) {
            return Err(CuratorError::Handler(format!(
                "{} refused to transform",
                request.context.relative_path
            )));
        }
        self.transforms.fetch_add(1, Ordering::SeqCst);
        self.outputs.lock().insert(id, request.asset_hash);
        Ok(TransformOutput::default())
    }

    fn generate_thumbnail(
        &self,
        request: &TransformRequest<'_>,
    ) -> Result<ThumbnailData, CuratorError> {
        self.thumbnails
            .lock()
            .insert(request.context.id, request.thumb_hash);
        Ok(ThumbnailData {
            path: PathBuf::from(request.context.relative_path),
            log: Vec::new(),
        })
    }
}
