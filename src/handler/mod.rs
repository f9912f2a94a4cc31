//! # Asset Type Handlers
//!
//! The curator never knows what a specific asset type means. Everything type specific, from
//! reading the declared dependencies out of a source file to producing the runtime output, goes
//! through the [`AssetTypeHandler`] trait. Handlers are registered per file extension in a
//! [`HandlerRegistry`]; the registry is consulted once when a file is classified and the resolved
//! handler is stored on the asset record.
//!
//! The crate ships one built-in handler, [`ManifestHandler`], for TOML asset descriptors
//! (`*.asset`). It records transform and thumbnail hashes in small JSON files below the data
//! directory's `AssetCache/` folder, which makes the whole pipeline usable without any external
//! conversion code.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    config::PlatformProfile,
    error::CuratorError,
    paths::extension_of,
    properties::{AssetId, AssetTypeFlags, LogEntry, TransformFlags},
};

pub mod manifest;

pub use manifest::ManifestHandler;

/// A named unit produced from an asset source besides the main asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAssetDescriptor {
    pub id: AssetId,
    pub name: String,
    pub type_name: String,
}

/// Everything the curator needs to know about an asset source, as reported by its handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHeader {
    pub id: AssetId,
    pub type_name: String,
    /// Transform-time inputs: asset identifiers or data-directory-relative paths.
    pub dependencies: BTreeSet<String>,
    /// Runtime references: asset identifiers or data-directory-relative paths.
    pub references: BTreeSet<String>,
    pub settings_hash: u64,
    #[serde(default)]
    pub sub_assets: Vec<SubAssetDescriptor>,
    /// The source still has to be imported before it can be transformed.
    #[serde(default)]
    pub needs_import: bool,
}

impl AssetHeader {
    pub fn new<S: Into<String>>(id: AssetId, type_name: S) -> Self {
        AssetHeader {
            id,
            type_name: type_name.into(),
            dependencies: BTreeSet::new(),
            references: BTreeSet::new(),
            settings_hash: 0,
            sub_assets: Vec::new(),
            needs_import: false,
        }
    }
}

/// Location of one asset as seen by a handler.
#[derive(Debug, Clone, Copy)]
pub struct AssetContext<'a> {
    pub id: AssetId,
    pub source: &'a Path,
    pub data_dir: &'a Path,
    /// Data-directory-relative source path with forward slashes.
    pub relative_path: &'a str,
    pub profile: &'a PlatformProfile,
}

#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    pub context: AssetContext<'a>,
    pub header: &'a AssetHeader,
    pub asset_hash: u64,
    pub thumb_hash: u64,
    pub flags: TransformFlags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub outputs: Vec<PathBuf>,
    pub log: Vec<LogEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThumbnailData {
    pub path: PathBuf,
    pub log: Vec<LogEntry>,
}

pub trait AssetTypeHandler: Send + Sync {
    fn type_name(&self) -> &str;

    /// Lowercase file extensions (without dot) owned by this handler.
    fn extensions(&self) -> Vec<String>;

    fn flags(&self) -> AssetTypeFlags {
        AssetTypeFlags::empty()
    }

    /// Reads the declared identity, dependencies and settings hash of a source file.
    fn parse_header(&self, path: &Path, relative_path: &str) -> Result<AssetHeader, CuratorError>;

    /// Asset hash stored with the last transform output for `ctx`, `None` if never transformed.
    fn recorded_output_hash(&self, ctx: &AssetContext<'_>) -> Option<u64>;

    /// Thumbnail hash stored with the last generated thumbnail, `None` if there is none.
    fn recorded_thumbnail_hash(&self, _ctx: &AssetContext<'_>) -> Option<u64> {
        None
    }

    /// Data-directory-relative path of the transform output, as listed in the asset lookup
    /// table.
    fn output_path(&self, relative_path: &str, profile: &PlatformProfile) -> String {
        format!(
            "{}/{}/{}",
            crate::paths::ASSET_CACHE_DIR,
            profile.name,
            relative_path
        )
    }

    fn transform(&self, request: &TransformRequest<'_>) -> Result<TransformOutput, CuratorError>;

    fn generate_thumbnail(
        &self,
        request: &TransformRequest<'_>,
    ) -> Result<ThumbnailData, CuratorError> {
        Err(CuratorError::Handler(format!(
            "{} assets do not support thumbnails ({:?})",
            self.type_name(),
            request.context.source
        )))
    }
}

impl fmt::Debug for dyn AssetTypeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetTypeHandler({})", self.type_name())
    }
}

/// Maps file extensions to handlers.
// Cloning shares the underlying registrations.
#[allow(clippy::type_complexity)]
pub struct HandlerRegistry(Arc<RwLock<Vec<(String, Arc<dyn AssetTypeHandler>)>>>);

impl Clone for HandlerRegistry {
    fn clone(&self) -> Self {
        HandlerRegistry(self.0.clone())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        HandlerRegistry::empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.extensions()).finish()
    }
}

impl HandlerRegistry {
    /// Registry with the built-in handlers.
    pub fn create() -> Self {
        let registry = HandlerRegistry::empty();
        registry.register(Arc::new(ManifestHandler::default()));
        registry
    }

    pub fn empty() -> Self {
        HandlerRegistry(Arc::new(RwLock::new(Vec::new())))
    }

    /// Registers `handler` for all of its extensions, replacing previous owners of an extension.
    pub fn register(&self, handler: Arc<dyn AssetTypeHandler>) {
        let mut writer = self.0.write();
        for extension in handler.extensions() {
            let extension = extension.trim_start_matches('.').to_lowercase();
            tracing::debug!(
                "[HandlerRegistry] .{} -> {}",
                extension,
                handler.type_name()
            );
            if let Some(entry) = writer.iter_mut().find(|(ext, _)| ext == &extension) {
                entry.1 = handler.clone();
            } else {
                writer.push((extension, handler.clone()));
            }
        }
    }

    pub fn get(&self, ext: &str) -> Option<Arc<dyn AssetTypeHandler>> {
        let ext = ext.to_lowercase();
        self.0
            .read()
            .iter()
            .find(|(handler_ext, _)| handler_ext == &ext)
            .map(|(_, handler)| handler.clone())
    }

    pub fn handler_for_path(&self, path: &Path) -> Option<Arc<dyn AssetTypeHandler>> {
        extension_of(path).and_then(|ext| self.get(&ext))
    }

    pub fn handler_for_type(&self, type_name: &str) -> Option<Arc<dyn AssetTypeHandler>> {
        self.0
            .read()
            .iter()
            .find(|(_, handler)| handler.type_name() == type_name)
            .map(|(_, handler)| handler.clone())
    }

    pub fn extensions(&self) -> Vec<String> {
        self.0.read().iter().map(|(ext, _)| ext.clone()).collect()
    }

    pub fn is_asset_extension(&self, ext: &str) -> bool {
        self.get(ext).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(&'static str);

    impl AssetTypeHandler for Dummy {
        fn type_name(&self) -> &str {
            self.0
        }

        fn extensions(&self) -> Vec<String> {
            vec![".TEX".to_string(), "dds".to_string()]
        }

        fn parse_header(&self, _path: &Path, rel: &str) -> Result<AssetHeader, CuratorError> {
            Ok(AssetHeader::new(AssetId::from_relative_path(rel), self.0))
        }

        fn recorded_output_hash(&self, _ctx: &AssetContext<'_>) -> Option<u64> {
            None
        }

        fn transform(&self, _req: &TransformRequest<'_>) -> Result<TransformOutput, CuratorError> {
            Ok(TransformOutput::default())
        }
    }

    #[test]
    fn registry_resolves_extensions_case_insensitively() {
        let registry = HandlerRegistry::create();
        registry.register(Arc::new(Dummy("Texture")));
        assert!(registry.is_asset_extension("asset"));
        assert_eq!(
            registry
                .handler_for_path(Path::new("/data/rock.Tex"))
                .map(|h| h.type_name().to_string()),
            Some("Texture".to_string())
        );
        assert!(registry.handler_for_type("Texture").is_some());
        assert!(registry.get("png").is_none());
    }

    #[test]
    fn later_registration_wins() {
        let registry = HandlerRegistry::empty();
        registry.register(Arc::new(Dummy("Old")));
        registry.register(Arc::new(Dummy("New")));
        assert_eq!(registry.get("dds").unwrap().type_name(), "New");
        assert_eq!(registry.extensions().len(), 2);
    }
}
