//! Identifier, state and flag types shared across the curator.

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    fs::Metadata,
    str::FromStr,
    time::SystemTime,
};
use uuid::Uuid;

use crate::error::CuratorError;

/// Namespace used for identifiers derived from data-directory-relative paths.
const ASSET_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6a, 0x1e, 0x52, 0x0c, 0x93, 0x4b, 0x4f, 0x37, 0x9a, 0x58, 0x0d, 0x2b, 0x44, 0xc1, 0x7e, 0x90,
]);

/// Process-wide unique identifier of an asset or sub-asset.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AssetId(Uuid);

impl AssetId {
    pub fn new() -> Self {
        AssetId(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        AssetId(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Deterministic identifier for assets whose source does not declare one. Stable as long as
    /// the data-directory-relative path does not change.
    pub fn from_relative_path(relative_path: &str) -> Self {
        AssetId(Uuid::new_v5(
            &ASSET_NAMESPACE,
            relative_path.to_lowercase().as_bytes(),
        ))
    }

    /// Identifier of a named sub-asset owned by `self`.
    pub fn sub_asset(&self, name: &str) -> Self {
        AssetId(Uuid::new_v5(&self.0, name.as_bytes()))
    }

    /// Returns `Some` only if the whole string is a well formed identifier.
    pub fn parse(candidate: &str) -> Option<Self> {
        Uuid::try_parse(candidate.trim()).ok().map(AssetId)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for AssetId {
    fn from(uuid: Uuid) -> Self {
        AssetId(uuid)
    }
}

impl FromStr for AssetId {
    type Err = CuratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(AssetId(Uuid::try_parse(s.trim())?))
    }
}

impl TryFrom<&str> for AssetId {
    type Error = CuratorError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Derived state of an asset's transformed output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TransformState {
    /// Never computed, invalidated, or a hash input was unavailable.
    #[default]
    Unknown,
    UpToDate,
    NeedsImport,
    NeedsTransform,
    NeedsThumbnail,
    TransformError,
    MissingDependency,
    MissingReference,
}

impl TransformState {
    pub const ALL: [TransformState; 8] = [
        TransformState::Unknown,
        TransformState::UpToDate,
        TransformState::NeedsImport,
        TransformState::NeedsTransform,
        TransformState::NeedsThumbnail,
        TransformState::TransformError,
        TransformState::MissingDependency,
        TransformState::MissingReference,
    ];

    /// States the update scheduler resolves by invoking the asset's handler.
    pub fn needs_processing(&self) -> bool {
        matches!(
            self,
            TransformState::NeedsImport
                | TransformState::NeedsTransform
                | TransformState::NeedsThumbnail
        )
    }

    /// A dependency in one of these states cannot contribute a hash to its dependents.
    pub fn is_unresolvable(&self) -> bool {
        matches!(
            self,
            TransformState::Unknown
                | TransformState::MissingDependency
                | TransformState::MissingReference
        )
    }
}

impl Display for TransformState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransformState::Unknown => "unknown",
            TransformState::UpToDate => "up to date",
            TransformState::NeedsImport => "needs import",
            TransformState::NeedsTransform => "needs transform",
            TransformState::NeedsThumbnail => "needs thumbnail",
            TransformState::TransformError => "transform error",
            TransformState::MissingDependency => "missing dependency",
            TransformState::MissingReference => "missing reference",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    /// Not (yet) confirmed by the current scan. Entries that stay unknown through a full scan are
    /// purged.
    #[default]
    Unknown,
    /// The file exists but could not be read; its hash is currently unavailable.
    Locked,
    Valid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExistenceState {
    #[default]
    FileAdded,
    FileModified,
    FileRemoved,
    FileUnchanged,
}

/// Capabilities an asset type handler declares for all assets it owns.
#[derive(Debug, EnumSetType, Serialize, Deserialize)]
pub enum AssetTypeFlag {
    SupportsThumbnail,
    AutoThumbnailOnTransform,
    DisableTransform,
    OnlyTransformManually,
}

pub type AssetTypeFlags = EnumSet<AssetTypeFlag>;

#[derive(Debug, EnumSetType, Serialize, Deserialize)]
pub enum TransformFlag {
    /// Run the handler even if the output is up to date.
    ForceTransform,
    /// The request came from a user rather than the background scheduler.
    TriggeredManually,
}

pub type TransformFlags = EnumSet<TransformFlag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn info<S: Into<String>>(message: S) -> Self {
        LogEntry {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning<S: Into<String>>(message: S) -> Self {
        LogEntry {
            level: LogLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        LogEntry {
            level: LogLevel::Error,
            message: message.into(),
        }
    }
}

/// Last known modification stamp of a file. Two stamps are identical only if both the
/// modification time and the size match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileTimestamp {
    pub modified: Option<SystemTime>,
    pub size: u64,
}

impl FileTimestamp {
    pub fn from_metadata(meta: &Metadata) -> Self {
        FileTimestamp {
            modified: meta.modified().ok(),
            size: meta.len(),
        }
    }

    pub fn invalid() -> Self {
        FileTimestamp::default()
    }

    pub fn is_valid(&self) -> bool {
        self.modified.is_some()
    }
}

/// Renders a 64-bit hash the way it appears in logs and lookup tables.
pub fn format_hash(hash: u64) -> String {
    hex::encode(hash.to_be_bytes())
}
