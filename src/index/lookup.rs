use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::{BTreeSet, HashSet},
    path::{Path, PathBuf},
};

use crate::{
    error::CuratorError,
    paths::{clean_path, to_slash_string},
    properties::{AssetId, FileStatus},
};

use super::{AssetIndex, EdgeKind};

/// Characters that can never be part of an asset file name on any supported platform.
static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"|?*\x00-\x1F]"#).expect("valid invalid-name regex"));

impl AssetIndex {
    /// Resolves a user supplied string to an asset or sub-asset identifier.
    ///
    /// Accepted forms, tried in order: an identifier, `"<main>|<sub-asset name>"`, an absolute
    /// path, a path relative to a data directory's parent, a path relative to a data directory.
    /// With `exhaustive`, the shortest known asset path ending in the given path (compared
    /// case-insensitively) is accepted as a last resort.
    pub fn find_sub_asset_id(&self, path_or_id: &str, exhaustive: bool) -> Option<AssetId> {
        let query = path_or_id.trim();
        if query.is_empty() {
            return None;
        }
        if let Some(id) = AssetId::parse(query) {
            return self.sub_assets.contains_key(&id).then_some(id);
        }
        if let Some((main, sub_name)) = query.split_once('|') {
            let main_id = self.find_sub_asset_id(main, exhaustive)?;
            let record = self.main_record_of(main_id)?;
            return record.sub_assets.iter().copied().find(|sub_id| {
                self.sub_assets
                    .get(sub_id)
                    .map(|view| view.name.eq_ignore_ascii_case(sub_name.trim()))
                    .unwrap_or(false)
            });
        }

        let as_path = Path::new(query);
        if as_path.is_absolute() {
            return self.asset_at_path(&clean_path(as_path));
        }
        let normalized = to_slash_string(as_path);
        for dir in self.paths.iter() {
            if let Some(parent) = dir.parent() {
                if let Some(id) = self.asset_at_path(&clean_path(parent.join(&normalized))) {
                    return Some(id);
                }
            }
        }
        for dir in self.paths.iter() {
            if let Some(id) = self.asset_at_path(&clean_path(dir.join(&normalized))) {
                return Some(id);
            }
        }
        if !exhaustive {
            return None;
        }

        let suffix = format!("/{}", normalized.to_lowercase());
        self.records()
            .filter(|record| {
                format!("/{}", to_slash_string(&record.absolute_path))
                    .to_lowercase()
                    .ends_with(&suffix)
            })
            .min_by_key(|record| record.absolute_path.as_os_str().len())
            .map(|record| record.id)
    }

    /// Every asset that depends on or references `id`, directly or (with `transitive`) through
    /// any chain of other assets.
    pub fn find_all_uses(&self, id: AssetId, transitive: bool) -> BTreeSet<AssetId> {
        let mut uses = BTreeSet::new();
        let Some(record) = self.main_record_of(id) else {
            return uses;
        };
        let mut todo = vec![record.absolute_path.clone()];
        let mut seen_paths: HashSet<PathBuf> = HashSet::new();
        while let Some(path) = todo.pop() {
            if !seen_paths.insert(path.clone()) {
                continue;
            }
            for kind in [EdgeKind::Dependency, EdgeKind::Reference] {
                for user in self.inverse_table(kind).dependents(&path) {
                    if user == record.id || !uses.insert(user) {
                        continue;
                    }
                    if transitive {
                        if let Some(user_record) = self.get_asset_record(user) {
                            todo.push(user_record.absolute_path.clone());
                        }
                    }
                }
            }
        }
        uses
    }

    /// Whether making `id` depend on `candidate` would close a dependency cycle.
    pub fn would_create_cycle(&self, id: AssetId, candidate: AssetId) -> bool {
        if id == candidate {
            return true;
        }
        let (Some(owner), Some(target)) = (self.main_record_of(id), self.main_record_of(candidate))
        else {
            return false;
        };
        owner.id == target.id || self.find_all_uses(owner.id, true).contains(&target.id)
    }

    /// Maps a bare file name or partial path onto the shortest known file that matches it, trying
    /// each allowed extension in turn. Names with characters that are invalid in file names are
    /// rejected with a sanitized suggestion.
    pub fn find_best_match_for_file(
        &self,
        candidate: &str,
        allowed_extensions: &[&str],
    ) -> Result<String, CuratorError> {
        let candidate = candidate.trim().replace('\\', "/");
        if INVALID_NAME_CHARS.is_match(&candidate) {
            return Err(CuratorError::InvalidName {
                suggestion: INVALID_NAME_CHARS.replace_all(&candidate, "_").into_owned(),
                name: candidate,
            });
        }

        let has_allowed_ext = crate::paths::extension_of(&candidate)
            .map(|ext| allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
            .unwrap_or(false);
        let mut names = vec![];
        if has_allowed_ext || allowed_extensions.is_empty() {
            names.push(candidate.clone());
        }
        for ext in allowed_extensions {
            names.push(format!("{}.{}", candidate, ext.trim_start_matches('.')));
        }

        for name in names.iter() {
            let suffix = format!("/{}", name.to_lowercase());
            let best = self
                .files
                .iter()
                .filter(|(_, entry)| entry.status == FileStatus::Valid)
                .map(|(path, _)| (path, format!("/{}", to_slash_string(path))))
                .filter(|(_, slashed)| slashed.to_lowercase().ends_with(&suffix))
                .min_by_key(|(_, slashed)| slashed.len());
            if let Some((path, slashed)) = best {
                return Ok(self.paths.data_dir_relative(path).unwrap_or(slashed));
            }
        }
        Err(CuratorError::NotFound(format!(
            "no file matches '{candidate}'"
        )))
    }
}
