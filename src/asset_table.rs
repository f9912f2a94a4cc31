//! Asset lookup tables.
//!
//! For every data directory and platform profile the curator maintains
//! `<data dir>/AssetCache/<profile>.assettable`, consumed by the runtime resource loader. Each
//! line maps an identifier to the data-directory-relative output path:
//!
//! ```text
//! 0d5c3c1e-4bd6-4e58-9d5e-0c8f3c1a6b2e;AssetCache/Default/meshes/rock.asset
//! 8a3f6d0e-5a4f-5f7b-9c1d-2e6b7a8c9d0f;AssetCache/Default/meshes/rock.asset|LOD0
//! ```
//!
//! Lines are sorted so that identical index contents always render identical files, and a table
//! is only rewritten when its content changed.

use std::{
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
};

use crate::{
    config::PlatformProfile, error::CuratorError, index::AssetIndex, paths::ASSET_CACHE_DIR,
};

pub const ASSET_TABLE_EXTENSION: &str = "assettable";

pub fn table_path(data_dir: &Path, profile: &PlatformProfile) -> PathBuf {
    data_dir
        .join(ASSET_CACHE_DIR)
        .join(format!("{}.{}", profile.name, ASSET_TABLE_EXTENSION))
}

pub fn render_asset_table(index: &AssetIndex, data_dir: &Path, profile: &PlatformProfile) -> String {
    let mut lines = Vec::new();
    for record in index.records().filter(|r| r.data_dir == data_dir) {
        let output = record.handler.output_path(&record.relative_path, profile);
        lines.push(format!("{};{}", record.id, output));
        for sub_id in record.sub_assets.iter() {
            if let Some(view) = index.sub_asset(*sub_id) {
                lines.push(format!("{};{}|{}", sub_id, output, view.name));
            }
        }
    }
    lines.sort();
    let mut table = lines.join("\n");
    if !table.is_empty() {
        table.push('\n');
    }
    table
}

/// Writes `content` to `path` unless the file already holds exactly that. Returns whether the
/// file was written.
pub fn write_if_changed(path: &Path, content: &str, force: bool) -> Result<bool, CuratorError> {
    if !force {
        if let Ok(existing) = read_to_string(path) {
            if existing == content {
                return Ok(false);
            }
        }
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    write(path, content)?;
    tracing::debug!("[AssetTable] Wrote {:?}", path);
    Ok(true)
}
