//! Persistent scan cache.
//!
//! One JSON document per data directory, stored at `<data dir>/AssetCache/AssetCurator.cache.json`.
//! It maps absolute file paths to the timestamp, content hash and parsed header observed during
//! the last session. The first scan of a new session trusts an entry only while the file's
//! timestamp still matches; anything else is re-read. A document with a different
//! [`CACHE_VERSION`] or one that fails to parse is dropped as a whole.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs::{create_dir_all, read_to_string, rename, write},
    path::{Path, PathBuf},
};

use crate::{
    error::CuratorError, handler::AssetHeader, paths::ASSET_CACHE_DIR, properties::FileTimestamp,
};

pub const CACHE_VERSION: u32 = 3;
pub const CACHE_FILE_NAME: &str = "AssetCurator.cache.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub timestamp: FileTimestamp,
    pub hash: u64,
    /// Parsed header, present for asset sources only.
    #[serde(default)]
    pub header: Option<AssetHeader>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    files: BTreeMap<String, CachedFile>,
}

pub fn cache_file(data_dir: &Path) -> PathBuf {
    data_dir.join(ASSET_CACHE_DIR).join(CACHE_FILE_NAME)
}

/// Reads the cache of one data directory. A missing file yields an empty map.
pub fn load_cache(data_dir: &Path) -> Result<HashMap<PathBuf, CachedFile>, CuratorError> {
    let path = cache_file(data_dir);
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let text = read_to_string(&path)?;
    let document: CacheDocument = serde_json::from_str(&text)
        .map_err(|e| CuratorError::Cache(format!("{path:?} is unreadable: {e}")))?;
    if document.version != CACHE_VERSION {
        return Err(CuratorError::Cache(format!(
            "{path:?} has version {}, expected {CACHE_VERSION}",
            document.version
        )));
    }
    Ok(document
        .files
        .into_iter()
        .map(|(path, entry)| (PathBuf::from(path), entry))
        .collect())
}

/// Writes the cache of one data directory through a temporary file.
pub fn save_cache<'a, I>(data_dir: &Path, entries: I) -> Result<usize, CuratorError>
where
    I: IntoIterator<Item = (&'a Path, CachedFile)>,
{
    let files: BTreeMap<String, CachedFile> = entries
        .into_iter()
        .map(|(path, entry)| (path.to_string_lossy().into_owned(), entry))
        .collect();
    let count = files.len();
    let document = CacheDocument {
        version: CACHE_VERSION,
        files,
    };
    let path = cache_file(data_dir);
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    write(&tmp, serde_json::to_string(&document)?)?;
    rename(&tmp, &path)?;
    tracing::debug!("[AssetCache] Wrote {} entries to {:?}", count, path);
    Ok(count)
}
