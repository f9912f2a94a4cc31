//! Built-in handler for TOML asset descriptors.
//!
//! ```toml
//! id = "0d5c3c1e-4bd6-4e58-9d5e-0c8f3c1a6b2e"   # optional, derived from the path otherwise
//! type = "Mesh"                                 # optional, defaults to "Asset"
//! dependencies = ["textures/rock.png"]
//! references = ["materials/rock.asset"]
//! sub_assets = ["LOD0", "Collision"]
//!
//! [settings]
//! scale = 2.0
//! ```
//!
//! The transform writes a JSON manifest below `AssetCache/<profile>/` that records the asset hash
//! it was produced from; thumbnails do the same below `AssetCache/Thumbnails/`.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
};

use crate::{
    error::CuratorError,
    hash::hash_bytes,
    paths::ASSET_CACHE_DIR,
    properties::{format_hash, AssetId, AssetTypeFlag, AssetTypeFlags, LogEntry},
};

use super::{
    AssetContext, AssetHeader, AssetTypeHandler, SubAssetDescriptor, ThumbnailData,
    TransformOutput, TransformRequest,
};

const THUMBNAIL_DIR: &str = "Thumbnails";

#[derive(Debug, Default, Deserialize)]
struct Descriptor {
    id: Option<String>,
    #[serde(rename = "type")]
    type_name: Option<String>,
    #[serde(default)]
    dependencies: BTreeSet<String>,
    #[serde(default)]
    references: BTreeSet<String>,
    #[serde(default)]
    sub_assets: Vec<String>,
    #[serde(default)]
    needs_import: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OutputRecord {
    id: AssetId,
    type_name: String,
    profile: String,
    hash: u64,
    hash_hex: String,
}

#[derive(Debug, Clone)]
pub struct ManifestHandler {
    extension: String,
}

impl Default for ManifestHandler {
    fn default() -> Self {
        ManifestHandler {
            extension: "asset".to_string(),
        }
    }
}

impl ManifestHandler {
    pub fn with_extension<S: Into<String>>(extension: S) -> Self {
        ManifestHandler {
            extension: extension.into(),
        }
    }

    fn output_file(&self, ctx: &AssetContext<'_>) -> PathBuf {
        ctx.data_dir
            .join(self.output_path(ctx.relative_path, ctx.profile))
            .with_extension(format!("{}.json", self.extension))
    }

    fn thumbnail_file(&self, ctx: &AssetContext<'_>) -> PathBuf {
        ctx.data_dir
            .join(ASSET_CACHE_DIR)
            .join(THUMBNAIL_DIR)
            .join(ctx.relative_path)
            .with_extension("thumb.json")
    }

    fn read_record(path: &Path) -> Option<OutputRecord> {
        let text = read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn write_record(path: &Path, record: &OutputRecord) -> Result<(), CuratorError> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(path, serde_json::to_string_pretty(record)?)?;
        Ok(())
    }
}

impl AssetTypeHandler for ManifestHandler {
    fn type_name(&self) -> &str {
        "Manifest"
    }

    fn extensions(&self) -> Vec<String> {
        vec![self.extension.clone()]
    }

    fn flags(&self) -> AssetTypeFlags {
        AssetTypeFlag::SupportsThumbnail | AssetTypeFlag::AutoThumbnailOnTransform
    }

    fn parse_header(&self, path: &Path, relative_path: &str) -> Result<AssetHeader, CuratorError> {
        let content = read_to_string(path)?;
        let descriptor: Descriptor = toml::from_str(&content)?;
        let id = match descriptor.id.as_deref() {
            Some(raw) => raw.parse::<AssetId>()?,
            None => AssetId::from_relative_path(relative_path),
        };
        let type_name = descriptor
            .type_name
            .unwrap_or_else(|| "Asset".to_string());
        let sub_assets = descriptor
            .sub_assets
            .iter()
            .map(|name| SubAssetDescriptor {
                id: id.sub_asset(name),
                name: name.clone(),
                type_name: type_name.clone(),
            })
            .collect();
        Ok(AssetHeader {
            id,
            type_name,
            dependencies: descriptor.dependencies,
            references: descriptor.references,
            settings_hash: hash_bytes(content.as_bytes()),
            sub_assets,
            needs_import: descriptor.needs_import,
        })
    }

    fn recorded_output_hash(&self, ctx: &AssetContext<'_>) -> Option<u64> {
        Self::read_record(&self.output_file(ctx))
            .filter(|record| record.id == ctx.id)
            .map(|record| record.hash)
    }

    fn recorded_thumbnail_hash(&self, ctx: &AssetContext<'_>) -> Option<u64> {
        Self::read_record(&self.thumbnail_file(ctx)).map(|record| record.hash)
    }

    fn transform(&self, request: &TransformRequest<'_>) -> Result<TransformOutput, CuratorError> {
        let ctx = &request.context;
        let output = self.output_file(ctx);
        Self::write_record(
            &output,
            &OutputRecord {
                id: ctx.id,
                type_name: request.header.type_name.clone(),
                profile: ctx.profile.name.clone(),
                hash: request.asset_hash,
                hash_hex: format_hash(request.asset_hash),
            },
        )?;
        Ok(TransformOutput {
            log: vec![LogEntry::info(format!(
                "wrote {} manifest for {}",
                ctx.profile.name, ctx.relative_path
            ))],
            outputs: vec![output],
        })
    }

    fn generate_thumbnail(
        &self,
        request: &TransformRequest<'_>,
    ) -> Result<ThumbnailData, CuratorError> {
        let ctx = &request.context;
        let path = self.thumbnail_file(ctx);
        Self::write_record(
            &path,
            &OutputRecord {
                id: ctx.id,
                type_name: request.header.type_name.clone(),
                profile: ctx.profile.name.clone(),
                hash: request.thumb_hash,
                hash_hex: format_hash(request.thumb_hash),
            },
        )?;
        Ok(ThumbnailData {
            path,
            log: Vec::new(),
        })
    }
}
