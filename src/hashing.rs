//! Transitive hull generation and asset hash computation.
//!
//! The hull of an asset is the set of files its output depends on, split by how they were
//! reached. Files reached only through dependency edges are transform inputs and feed the asset
//! hash; anything reached through at least one reference edge only feeds the thumbnail hash.
//! Declarations that resolve nowhere are collected as missing so the state machine can report
//! them instead of computing a hash.

use parking_lot::RwLock;
use std::{
    collections::{BTreeSet, HashSet, VecDeque},
    fs::metadata,
    path::{Path, PathBuf},
};

use crate::{
    error::CuratorError,
    hash::{fold, hash_file},
    index::{AssetIndex, EdgeKind, Resolution},
    properties::{AssetId, FileStatus, FileTimestamp, TransformState},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitiveHull {
    pub dependencies: BTreeSet<PathBuf>,
    pub references: BTreeSet<PathBuf>,
    /// Declared strings that resolve to neither a known asset nor an existing file.
    pub missing_dependencies: BTreeSet<String>,
    pub missing_references: BTreeSet<String>,
}

impl TransitiveHull {
    pub fn is_complete(&self) -> bool {
        self.missing_dependencies.is_empty() && self.missing_references.is_empty()
    }
}

/// Walks dependency and reference edges starting at `root`. Every (file, edge kind) pair is
/// expanded at most once, so cyclic declarations terminate. The root's own source file is not
/// part of the hull.
pub fn generate_transitive_hull(index: &AssetIndex, root: AssetId) -> Option<TransitiveHull> {
    let root_record = index.main_record_of(root)?;
    let root_path = root_record.absolute_path.clone();

    let mut hull = TransitiveHull::default();
    let mut expanded: HashSet<(PathBuf, EdgeKind)> = HashSet::new();
    expanded.insert((root_path.clone(), EdgeKind::Dependency));
    expanded.insert((root_path.clone(), EdgeKind::Reference));

    let mut queue: VecDeque<(String, PathBuf, EdgeKind)> = VecDeque::new();
    for dep in root_record.header.dependencies.iter() {
        queue.push_back((dep.clone(), root_record.data_dir.clone(), EdgeKind::Dependency));
    }
    for reference in root_record.header.references.iter() {
        queue.push_back((
            reference.clone(),
            root_record.data_dir.clone(),
            EdgeKind::Reference,
        ));
    }

    while let Some((declared, owner_data_dir, kind)) = queue.pop_front() {
        if declared.trim().is_empty() {
            continue;
        }
        let (found, missing) = match kind {
            EdgeKind::Dependency => (&mut hull.dependencies, &mut hull.missing_dependencies),
            EdgeKind::Reference => (&mut hull.references, &mut hull.missing_references),
        };
        match index.resolve_declared(&declared, &owner_data_dir) {
            Resolution::Missing(_) | Resolution::UnknownAsset(_) => {
                missing.insert(declared);
            }
            Resolution::File(path) => {
                if path != root_path {
                    found.insert(path);
                }
            }
            Resolution::Asset(id, path) => {
                if path != root_path {
                    found.insert(path.clone());
                }
                if !expanded.insert((path, kind)) {
                    continue;
                }
                if let Some(record) = index.main_record_of(id) {
                    for dep in record.header.dependencies.iter() {
                        queue.push_back((dep.clone(), record.data_dir.clone(), kind));
                    }
                    for reference in record.header.references.iter() {
                        queue.push_back((
                            reference.clone(),
                            record.data_dir.clone(),
                            EdgeKind::Reference,
                        ));
                    }
                }
            }
        }
    }

    let TransitiveHull {
        dependencies,
        references,
        ..
    } = &mut hull;
    references.retain(|path| !dependencies.contains(path));
    Some(hull)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashOutcome {
    pub asset_hash: u64,
    pub thumb_hash: u64,
    /// Set when the hashes could not be computed. `Unknown` means a file was locked.
    pub failure: Option<TransformState>,
    pub missing_dependencies: BTreeSet<String>,
    pub missing_references: BTreeSet<String>,
}

/// Content hash of one file, reusing the indexed hash while the file timestamp is unchanged.
/// A rehash is written back only if the entry did not change while the file was being read. A
/// file that cannot be read is marked [`FileStatus::Locked`].
pub fn file_content_hash(
    index: &RwLock<AssetIndex>,
    path: &Path,
    force: bool,
) -> Result<u64, CuratorError> {
    let meta = metadata(path)?;
    if !meta.is_file() {
        return Err(CuratorError::NotFound(format!("{path:?} is not a file")));
    }
    let timestamp = FileTimestamp::from_metadata(&meta);
    let known = index
        .read()
        .file(path)
        .map(|entry| (entry.timestamp, entry.hash, entry.status));
    if let Some((known_timestamp, hash, status)) = known {
        if !force && status == FileStatus::Valid && known_timestamp == timestamp {
            return Ok(hash);
        }
    }

    let hash = match hash_file(path) {
        Ok(hash) => hash,
        Err(e) => {
            // Flagged so the next scan re-reads the file and re-queues its dependents.
            if e.is_transient() {
                index.write().commit_file(path, timestamp, None, false);
            }
            return Err(e);
        }
    };

    let mut writer = index.write();
    let unchanged_since_read = writer.file(path).map(|entry| entry.timestamp)
        == known.map(|(known_timestamp, _, _)| known_timestamp);
    if unchanged_since_read {
        writer.commit_file(path, timestamp, Some(hash), false);
    }
    Ok(hash)
}

/// Folds the content hashes of the hull into the asset and thumbnail hashes. Dependencies feed
/// both, references only the thumbnail hash. `settings_hash` seeds both.
pub fn hash_asset(
    index: &RwLock<AssetIndex>,
    settings_hash: u64,
    hull: &TransitiveHull,
    force: bool,
) -> HashOutcome {
    let mut outcome = HashOutcome {
        asset_hash: settings_hash,
        thumb_hash: settings_hash,
        failure: None,
        missing_dependencies: hull.missing_dependencies.clone(),
        missing_references: hull.missing_references.clone(),
    };
    let mut locked = false;
    let display = |path: &Path| {
        index
            .read()
            .data_dirs()
            .data_dir_relative(path)
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    };

    for path in hull.dependencies.iter() {
        match file_content_hash(index, path, force) {
            Ok(hash) => {
                outcome.asset_hash = fold(outcome.asset_hash, hash);
                outcome.thumb_hash = fold(outcome.thumb_hash, hash);
            }
            Err(e) if e.is_transient() => {
                tracing::debug!("[HashEngine] {:?} is locked: {}", path, e);
                locked = true;
            }
            Err(_) => {
                outcome.missing_dependencies.insert(display(path));
            }
        }
    }
    for path in hull.references.iter() {
        match file_content_hash(index, path, force) {
            Ok(hash) => outcome.thumb_hash = fold(outcome.thumb_hash, hash),
            Err(e) if e.is_transient() => {
                tracing::debug!("[HashEngine] {:?} is locked: {}", path, e);
                locked = true;
            }
            Err(_) => {
                outcome.missing_references.insert(display(path));
            }
        }
    }

    if locked {
        outcome.asset_hash = 0;
        outcome.thumb_hash = 0;
        outcome.failure = Some(TransformState::Unknown);
    } else if !outcome.missing_dependencies.is_empty() {
        outcome.asset_hash = 0;
        outcome.thumb_hash = 0;
        outcome.failure = Some(TransformState::MissingDependency);
    } else if !outcome.missing_references.is_empty() {
        outcome.thumb_hash = 0;
        outcome.failure = Some(TransformState::MissingReference);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handler::{AssetHeader, AssetTypeHandler},
        paths::DataDirectories,
        tests::helpers::{init_logging, TestHandler},
    };
    use std::{fs::write, sync::Arc};
    use tempfile::TempDir;

    fn add(index: &mut AssetIndex, dir: &Path, rel: &str, header: AssetHeader) -> PathBuf {
        let path = dir.join(rel);
        write(&path, rel).unwrap();
        let meta = metadata(&path).unwrap();
        index.commit_file(
            &path,
            FileTimestamp::from_metadata(&meta),
            Some(crate::hash::hash_bytes(rel.as_bytes())),
            false,
        );
        let handler: Arc<dyn AssetTypeHandler> = Arc::new(TestHandler::default());
        index.classify_asset(&path, header, handler, true).unwrap();
        path
    }

    fn plain(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        write(&path, content).unwrap();
        path
    }

    #[test]
    fn reference_cycles_terminate() {
        init_logging();
        let tmp = TempDir::new().unwrap();
        let mut index = AssetIndex::new(DataDirectories::new(&[tmp.path()]));
        let dir = index.data_dirs().iter().next().unwrap().clone();
        plain(&dir, "a.png", "a");
        plain(&dir, "b.png", "b");

        let (a, b) = (AssetId::new(), AssetId::new());
        let mut header_a = AssetHeader::new(a, "Test");
        header_a.references.insert(b.to_string());
        header_a.dependencies.insert("a.png".to_string());
        let mut header_b = AssetHeader::new(b, "Test");
        header_b.references.insert(a.to_string());
        header_b.dependencies.insert("b.png".to_string());
        let path_a = add(&mut index, &dir, "a.tst", header_a);
        let path_b = add(&mut index, &dir, "b.tst", header_b);

        let hull = generate_transitive_hull(&index, a).unwrap();
        assert_eq!(
            hull.dependencies,
            BTreeSet::from([dir.join("a.png")])
        );
        assert_eq!(
            hull.references,
            BTreeSet::from([path_b, dir.join("b.png")])
        );
        assert!(!hull.references.contains(&path_a));
        assert!(hull.is_complete());
    }

    #[test]
    fn missing_dependency_zeroes_both_hashes() {
        init_logging();
        let tmp = TempDir::new().unwrap();
        let mut index = AssetIndex::new(DataDirectories::new(&[tmp.path()]));
        let dir = index.data_dirs().iter().next().unwrap().clone();
        plain(&dir, "ref.png", "r");

        let id = AssetId::new();
        let mut header = AssetHeader::new(id, "Test");
        header.dependencies.insert("nowhere.png".to_string());
        header.references.insert("ref.png".to_string());
        add(&mut index, &dir, "m.tst", header);

        let hull = generate_transitive_hull(&index, id).unwrap();
        assert!(hull.missing_dependencies.contains("nowhere.png"));
        let index = RwLock::new(index);
        let outcome = hash_asset(&index, 7, &hull, false);
        assert_eq!(outcome.failure, Some(TransformState::MissingDependency));
        assert_eq!((outcome.asset_hash, outcome.thumb_hash), (0, 0));
    }

    #[test]
    fn references_only_feed_the_thumbnail_hash() {
        init_logging();
        let tmp = TempDir::new().unwrap();
        let mut index = AssetIndex::new(DataDirectories::new(&[tmp.path()]));
        let dir = index.data_dirs().iter().next().unwrap().clone();
        plain(&dir, "dep.png", "d");
        plain(&dir, "ref.png", "r");

        let id = AssetId::new();
        let mut header = AssetHeader::new(id, "Test");
        header.dependencies.insert("dep.png".to_string());
        header.references.insert("ref.png".to_string());
        add(&mut index, &dir, "m.tst", header);

        let hull = generate_transitive_hull(&index, id).unwrap();
        let index = RwLock::new(index);
        let before = hash_asset(&index, 1, &hull, false);
        assert_eq!(before.failure, None);
        assert_ne!(before.asset_hash, before.thumb_hash);

        plain(&dir, "ref.png", "changed reference");
        let after = hash_asset(&index, 1, &hull, false);
        assert_eq!(after.asset_hash, before.asset_hash);
        assert_ne!(after.thumb_hash, before.thumb_hash);

        // Deterministic for identical inputs.
        assert_eq!(hash_asset(&index, 1, &hull, true), after);
    }
}
