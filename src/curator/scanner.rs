use std::{fs::metadata, io, path::Path};
use walkdir::WalkDir;

use crate::{
    error::CuratorError,
    hash::hash_file,
    index::FileChange,
    paths::clean_path,
    properties::{AssetId, FileStatus, FileTimestamp},
};

use super::CuratorCore;

impl CuratorCore {
    /// Reconciles one path with the index: refreshes timestamp and content hash, classifies the
    /// file as an asset source when a handler owns its extension, and invalidates everything that
    /// depends on the file if its content changed.
    pub(crate) fn handle_single_file(&self, path: &Path) -> Result<FileChange, CuratorError> {
        if self.paths.is_ignored(path) {
            return Ok(FileChange::Ignored);
        }
        let meta = match metadata(path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(self.index.write().remove_file(path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(self.index.write().remove_file(path));
            }
            Err(e) => {
                tracing::debug!("[Scanner] Cannot stat {:?}: {}", path, e);
                return Ok(self.index.write().commit_file(
                    path,
                    FileTimestamp::invalid(),
                    None,
                    false,
                ));
            }
        };
        let timestamp = FileTimestamp::from_metadata(&meta);
        let inside = self.paths.is_inside(path);
        let handler = if inside {
            self.handlers.handler_for_path(path)
        } else {
            None
        };

        {
            let mut index = self.index.write();
            if let Some(entry) = index.file(path) {
                let unchanged = entry.timestamp == timestamp
                    && timestamp.is_valid()
                    && entry.status != FileStatus::Locked;
                let classified = handler.is_none()
                    || entry
                        .asset
                        .map(|id| index.contains_asset(id))
                        .unwrap_or(false);
                if unchanged && classified {
                    index.confirm_file(path);
                    return Ok(FileChange::Unchanged);
                }
            }
        }

        // Slow path, lock released while reading the file.
        let cached = self.take_cached(path, timestamp);
        let hash = match &cached {
            Some(cached) => Ok(cached.hash),
            None => hash_file(path),
        };
        let hash = match hash {
            Ok(hash) => Some(hash),
            Err(CuratorError::NotFound(_)) => return Ok(self.index.write().remove_file(path)),
            Err(e) if e.is_transient() => None,
            Err(e) => return Err(e),
        };
        let relative_path = self.paths.data_dir_relative(path).unwrap_or_default();
        let header = match (&handler, hash) {
            (Some(handler), Some(_)) => match cached.and_then(|c| c.header) {
                Some(header) => Some(header),
                None => match handler.parse_header(path, &relative_path) {
                    Ok(header) => Some(header),
                    Err(e) => {
                        tracing::warn!(
                            "[Scanner] {} could not read {:?}: {}",
                            handler.type_name(),
                            path,
                            e
                        );
                        None
                    }
                },
            },
            _ => None,
        };

        let mut index = self.index.write();
        let change = index.commit_file(path, timestamp, hash, true);
        match (header, handler) {
            (Some(header), Some(handler)) => {
                if let Err(e) = index.classify_asset(path, header, handler, change.is_change()) {
                    tracing::warn!("[Scanner] {:?} was not registered as an asset: {}", path, e);
                }
            }
            _ if hash.is_some() => {
                if let Some(id) = index.file(path).and_then(|entry| entry.asset) {
                    tracing::info!("[Scanner] {:?} is no longer an asset source", path);
                    index.remove_asset(id);
                }
            }
            _ => {}
        }
        Ok(change)
    }

    /// Recursive scan of one data directory. Every file is registered, asset sources are
    /// classified. Returns the number of files that were added or changed.
    pub fn iterate_data_directory(&self, dir: &Path) -> Result<usize, CuratorError> {
        let mut changes = 0;
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.paths.is_ignored(entry.path()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("[Scanner] Skipping unreadable entry below {:?}: {}", dir, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match self.handle_single_file(&clean_path(entry.path())) {
                Ok(change) if change.is_change() => changes += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!("[Scanner] Failed to handle {:?}: {}", entry.path(), e),
            }
        }
        Ok(changes)
    }

    /// Full reconciliation pass: marks all entries unknown, rescans every data directory and
    /// re-examines files outside of them, then purges what was not seen. Emits `AssetListReset`
    /// if anything changed.
    pub(crate) fn reconcile_file_system(&self) -> Result<usize, CuratorError> {
        let existed = self.index.write().mark_all_unknown();
        let mut changes = 0;
        for dir in self.paths.iter() {
            if !dir.is_dir() {
                tracing::warn!("[Scanner] Data directory {:?} does not exist", dir);
                continue;
            }
            changes += self.iterate_data_directory(dir)?;
        }

        let outside: Vec<_> = self
            .index
            .read()
            .unknown_files()
            .into_iter()
            .filter(|path| !self.paths.is_inside(path))
            .collect();
        for path in outside {
            if let Ok(change) = self.handle_single_file(&path) {
                if change.is_change() {
                    changes += 1;
                }
            }
        }

        let mut index = self.index.write();
        changes += index.purge_unknown_files(&existed);
        if changes > 0 {
            index.reset_list();
        }
        tracing::debug!("[Scanner] File system check found {} changes", changes);
        Ok(changes)
    }

    /// Incremental update for one path reported by a watcher or the host. Directories are
    /// scanned, vanished directories remove every known file below them.
    pub fn notify_of_file_change(&self, path: &Path) -> Result<FileChange, CuratorError> {
        let path = clean_path(path);
        let change = if path.is_dir() {
            match self.iterate_data_directory(&path)? {
                0 => FileChange::Unchanged,
                _ => FileChange::Modified,
            }
        } else {
            let known_below: Vec<_> = if path.exists() {
                Vec::new()
            } else {
                self.index
                    .read()
                    .files()
                    .filter(|(known, entry)| known.starts_with(&path) && **known != path && entry.exists())
                    .map(|(known, _)| known.clone())
                    .collect()
            };
            let mut change = self.handle_single_file(&path)?;
            for known in known_below {
                if self.handle_single_file(&known)?.is_change() {
                    change = FileChange::Removed;
                }
            }
            change
        };
        self.flush_events();
        self.wake_workers();
        Ok(change)
    }

    /// Re-examines the source file of an asset.
    pub fn notify_of_asset_change(&self, id: AssetId) -> Result<FileChange, CuratorError> {
        let path = self
            .index
            .read()
            .main_record_of(id)
            .map(|record| record.absolute_path.clone())
            .ok_or_else(|| CuratorError::NotFound(format!("asset {id}")))?;
        self.notify_of_file_change(&path)
    }
}
