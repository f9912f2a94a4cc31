//! Data directory bookkeeping and path normalization.
//!
//! All index keys are absolute, lexically cleaned paths. Declared dependency strings inside asset
//! headers are either asset identifiers or paths relative to a data directory (or to a data
//! directory's parent); [`DataDirectories`] turns the latter into candidate absolute paths.

use std::path::{Component, Path, PathBuf};

/// Folder name under each data directory that holds derived data (caches, outputs, tables).
pub const ASSET_CACHE_DIR: &str = "AssetCache";

/// Removes `.` components and resolves `..` lexically without touching the file system.
pub fn clean_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Forward slash rendering used for relative paths stored in records, caches and tables.
pub fn to_slash_string<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// True for dot files and anything inside a dot folder.
pub fn is_hidden<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().components().any(|c| match c {
        Component::Normal(part) => part.to_str().map(|s| s.starts_with('.')).unwrap_or(false),
        _ => false,
    })
}

pub fn is_in_asset_cache<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().components().any(|c| match c {
        Component::Normal(part) => part == ASSET_CACHE_DIR,
        _ => false,
    })
}

/// Lowercase extension without the dot.
pub fn extension_of<P: AsRef<Path>>(path: P) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

#[derive(Debug, Clone, Default)]
pub struct DataDirectories {
    dirs: Vec<PathBuf>,
}

impl DataDirectories {
    /// Data directories are canonicalized when they exist so that watcher events and scan
    /// results agree on path spelling.
    pub fn new<P: AsRef<Path>>(dirs: &[P]) -> Self {
        let dirs = dirs
            .iter()
            .map(|dir| match std::fs::canonicalize(dir.as_ref()) {
                Ok(canonical) => canonical,
                Err(e) => {
                    tracing::warn!(
                        "[DataDirectories] Cannot canonicalize {:?} ({}), using it as given",
                        dir.as_ref(),
                        e
                    );
                    clean_path(dir)
                }
            })
            .collect();
        DataDirectories { dirs }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.dirs.iter()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// The data directory containing `path`, preferring the most specific one when directories
    /// are nested.
    pub fn data_dir_of(&self, path: &Path) -> Option<&Path> {
        self.dirs
            .iter()
            .filter(|dir| path.starts_with(dir))
            .max_by_key(|dir| dir.components().count())
            .map(|dir| dir.as_path())
    }

    pub fn is_inside(&self, path: &Path) -> bool {
        self.data_dir_of(path).is_some()
    }

    pub fn data_dir_relative(&self, path: &Path) -> Option<String> {
        let dir = self.data_dir_of(path)?;
        path.strip_prefix(dir).ok().map(to_slash_string)
    }

    /// Relative path including the data directory's own folder name.
    pub fn data_dir_parent_relative(&self, path: &Path) -> Option<String> {
        let dir = self.data_dir_of(path)?;
        let parent = dir.parent().unwrap_or(dir);
        path.strip_prefix(parent).ok().map(to_slash_string)
    }

    /// Dot entries and derived data below a data directory are never indexed. Only the part of
    /// the path below the data directory is inspected, temp folders like `/tmp/.tmpX/` are fine.
    pub fn is_ignored(&self, path: &Path) -> bool {
        match self.data_dir_of(path).and_then(|dir| path.strip_prefix(dir).ok()) {
            Some(relative) => is_hidden(relative) || is_in_asset_cache(relative),
            None => false,
        }
    }

    pub fn cache_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(ASSET_CACHE_DIR)
    }

    /// Candidate absolute paths for a declared path, in resolution order: the path itself if
    /// absolute, the owner's data directory, every other data directory, then every data
    /// directory's parent.
    pub fn candidates(&self, declared: &str, owner_data_dir: Option<&Path>) -> Vec<PathBuf> {
        let declared_path = Path::new(declared.trim());
        if declared_path.is_absolute() {
            return vec![clean_path(declared_path)];
        }
        let mut out = Vec::with_capacity(self.dirs.len() * 2 + 1);
        if let Some(owner) = owner_data_dir {
            out.push(clean_path(owner.join(declared_path)));
        }
        for dir in self.dirs.iter() {
            let candidate = clean_path(dir.join(declared_path));
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        for dir in self.dirs.iter() {
            if let Some(parent) = dir.parent() {
                let candidate = clean_path(parent.join(declared_path));
                if !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_path_resolves_dots() {
        assert_eq!(
            clean_path("/data/./meshes/../textures/rock.png"),
            PathBuf::from("/data/textures/rock.png")
        );
    }

    #[test]
    fn relative_forms() {
        let dirs = DataDirectories::new(&["/nonexistent/project/assets"]);
        let file = Path::new("/nonexistent/project/assets/meshes/rock.asset");
        assert_eq!(
            dirs.data_dir_relative(file).as_deref(),
            Some("meshes/rock.asset")
        );
        assert_eq!(
            dirs.data_dir_parent_relative(file).as_deref(),
            Some("assets/meshes/rock.asset")
        );
        assert!(dirs.data_dir_relative(Path::new("/elsewhere/x.png")).is_none());
    }

    #[test]
    fn candidates_prefer_owner_directory() {
        let dirs = DataDirectories::new(&["/nonexistent/a", "/nonexistent/b"]);
        let candidates = dirs.candidates("tex.png", Some(Path::new("/nonexistent/b")));
        assert_eq!(candidates[0], PathBuf::from("/nonexistent/b/tex.png"));
        assert_eq!(candidates[1], PathBuf::from("/nonexistent/a/tex.png"));
        assert_eq!(candidates[2], PathBuf::from("/nonexistent/tex.png"));
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn hidden_and_cache_paths() {
        assert!(is_hidden("/data/.git/config"));
        assert!(!is_hidden("/data/meshes/rock.asset"));
        assert!(is_in_asset_cache("/data/AssetCache/PC/rock.json"));
        let dirs = DataDirectories::new(&["/nonexistent/.tmp123/assets"]);
        assert!(!dirs.is_ignored(Path::new("/nonexistent/.tmp123/assets/rock.png")));
        assert!(dirs.is_ignored(Path::new("/nonexistent/.tmp123/assets/.rock.png")));
        assert!(dirs.is_ignored(Path::new(
            "/nonexistent/.tmp123/assets/AssetCache/table.txt"
        )));
        assert_eq!(extension_of("Rock.PNG").as_deref(), Some("png"));
    }
}
