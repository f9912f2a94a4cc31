use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use crate::{
    handler::{AssetHeader, AssetTypeHandler},
    properties::{AssetId, ExistenceState, FileStatus, FileTimestamp, LogEntry, TransformState},
};

use super::arena::RecordKey;

/// One row per absolute path the curator has ever seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub timestamp: FileTimestamp,
    pub hash: u64,
    pub asset: Option<AssetId>,
    pub status: FileStatus,
}

impl FileEntry {
    /// Whether the file is known to exist, even if its hash is currently unavailable.
    pub fn exists(&self) -> bool {
        matches!(self.status, FileStatus::Valid | FileStatus::Locked)
    }
}

/// Asset-type specific projection of one asset or sub-asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAssetView {
    pub name: String,
    pub type_name: String,
    pub existence: ExistenceState,
    pub last_access: Option<SystemTime>,
    pub is_main: bool,
    /// Owning record, resolved through the index. Lookup only.
    pub record: RecordKey,
}

impl SubAssetView {
    pub fn main<S: Into<String>, T: Into<String>>(name: S, type_name: T, record: RecordKey) -> Self {
        SubAssetView {
            name: name.into(),
            type_name: type_name.into(),
            existence: ExistenceState::FileAdded,
            last_access: None,
            is_main: true,
            record,
        }
    }

    pub fn sub<S: Into<String>, T: Into<String>>(name: S, type_name: T, record: RecordKey) -> Self {
        SubAssetView {
            is_main: false,
            ..SubAssetView::main(name, type_name, record)
        }
    }
}

/// Paths an asset is currently registered under in the inverse tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedFiles {
    pub dependencies: BTreeSet<PathBuf>,
    pub references: BTreeSet<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub id: AssetId,
    pub state: TransformState,
    /// Bumped on every state write and invalidation. Computations started under an older value
    /// are discarded at commit time.
    pub generation: u64,
    pub asset_hash: u64,
    pub thumb_hash: u64,
    pub log: Vec<LogEntry>,
    pub missing_dependencies: BTreeSet<String>,
    pub missing_references: BTreeSet<String>,
    pub absolute_path: PathBuf,
    pub data_dir: PathBuf,
    pub relative_path: String,
    /// Owned sub-assets, excluding the main asset which shares `id`.
    pub sub_assets: BTreeSet<AssetId>,
    pub header: AssetHeader,
    pub handler: Arc<dyn AssetTypeHandler>,
    pub(crate) tracked: TrackedFiles,
}

impl AssetRecord {
    pub(crate) fn new(
        absolute_path: PathBuf,
        data_dir: PathBuf,
        relative_path: String,
        header: AssetHeader,
        handler: Arc<dyn AssetTypeHandler>,
    ) -> Self {
        AssetRecord {
            id: header.id,
            state: TransformState::Unknown,
            generation: 0,
            asset_hash: 0,
            thumb_hash: 0,
            log: Vec::new(),
            missing_dependencies: BTreeSet::new(),
            missing_references: BTreeSet::new(),
            absolute_path,
            data_dir,
            relative_path,
            sub_assets: BTreeSet::new(),
            header,
            handler,
            tracked: TrackedFiles::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.absolute_path
    }

    pub fn tracked_dependencies(&self) -> &BTreeSet<PathBuf> {
        &self.tracked.dependencies
    }

    pub fn tracked_references(&self) -> &BTreeSet<PathBuf> {
        &self.tracked.references
    }

    /// File name used as the display name of the main sub-asset.
    pub fn display_name(&self) -> String {
        self.absolute_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.relative_path.clone())
    }
}
