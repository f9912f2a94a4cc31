//! # Asset Index
//!
//! [`AssetIndex`] is the authoritative store behind the curator's single reader/writer lock. It
//! owns four kinds of data:
//!
//! - **File entries**: one [`FileEntry`] per absolute path ever observed, with timestamp, content
//!   hash, status and an optional link to the asset the file is the source of.
//! - **Asset records**: one [`AssetRecord`] per asset identifier, stored in a [`RecordArena`] and
//!   addressed by [`RecordKey`]. Records carry the derived transform state and the generation
//!   counter used to discard stale computations.
//! - **Sub-asset views**: one [`SubAssetView`] per asset or sub-asset identifier. Views point back
//!   at their record through a `RecordKey`, never by ownership.
//! - **Inverse tables**: referenced path to dependent assets, separately for transform
//!   dependencies and runtime references, plus the [`UnresolvedEdges`] declared by identifier
//!   before the target asset was known.
//!
//! ## Invalidation
//!
//! Whenever a file's content hash changes, every asset registered for that path in either
//! inverse table is invalidated: its state drops to `Unknown`, its hashes are cleared, its
//! generation is bumped and it joins the stale queue. Invalidation propagates through the
//! dependents of the invalidated asset's own source file, so a change deep in a dependency chain
//! reaches every asset above it.
//!
//! ## Events
//!
//! Mutations never call listeners directly. They record [`PendingChanges`] which the curator
//! drains after releasing the lock, see [`AssetIndex::take_events`].
//!
//! [`PendingChanges`]: crate::event::PendingChanges

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use crate::{
    error::CuratorError,
    event::{ChangeKind, CuratorEvent, PendingChanges},
    handler::{AssetHeader, AssetTypeHandler},
    paths::DataDirectories,
    properties::{AssetId, ExistenceState, FileStatus, FileTimestamp, TransformState},
};

mod arena;
mod inverse;
mod lookup;
mod record;


pub use arena::{RecordArena, RecordKey};
pub use inverse::{EdgeKind, InverseTable, UnresolvedEdges};
pub use record::{AssetRecord, FileEntry, SubAssetView, TrackedFiles};

/// What a declared dependency string points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A known asset, with the absolute path of its source file.
    Asset(AssetId, PathBuf),
    /// A known or existing plain file.
    File(PathBuf),
    /// An identifier that no indexed asset carries (yet).
    UnknownAsset(AssetId),
    /// A path that exists nowhere. Holds the most likely location, used for tracking.
    Missing(PathBuf),
}

/// Outcome of reconciling one path with the file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Unchanged,
    Added,
    Modified,
    Removed,
    Locked,
    Ignored,
}

impl FileChange {
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            FileChange::Added | FileChange::Modified | FileChange::Removed
        )
    }
}

/// Freshly computed state, committed with [`AssetIndex::commit_transform_state`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub state: TransformState,
    pub asset_hash: u64,
    pub thumb_hash: u64,
    pub missing_dependencies: BTreeSet<String>,
    pub missing_references: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied(TransformState),
    /// The record's generation moved on while the computation ran. Carries the current state.
    Discarded(TransformState),
}

impl CommitOutcome {
    pub fn state(&self) -> TransformState {
        match self {
            CommitOutcome::Applied(state) | CommitOutcome::Discarded(state) => *state,
        }
    }
}

/// Assets awaiting a state update, in the order they first became stale.
#[derive(Debug, Default)]
struct StaleQueue {
    order: BTreeMap<u64, AssetId>,
    seq_of: HashMap<AssetId, u64>,
    next: u64,
}

impl StaleQueue {
    fn push(&mut self, id: AssetId) {
        if self.seq_of.contains_key(&id) {
            return;
        }
        self.next += 1;
        self.order.insert(self.next, id);
        self.seq_of.insert(id, self.next);
    }

    fn remove(&mut self, id: AssetId) -> bool {
        match self.seq_of.remove(&id) {
            Some(seq) => {
                self.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    fn contains(&self, id: AssetId) -> bool {
        self.seq_of.contains_key(&id)
    }

    fn iter(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.order.values().copied()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.seq_of.clear();
    }
}

#[derive(Debug)]
pub struct AssetIndex {
    paths: DataDirectories,
    files: HashMap<PathBuf, FileEntry>,
    records: RecordArena<AssetRecord>,
    record_keys: HashMap<AssetId, RecordKey>,
    sub_assets: HashMap<AssetId, SubAssetView>,
    inverse_dependencies: InverseTable,
    inverse_references: InverseTable,
    unresolved_dependencies: UnresolvedEdges,
    unresolved_references: UnresolvedEdges,
    stale: StaleQueue,
    in_flight: HashSet<AssetId>,
    open_assets: HashSet<AssetId>,
    pending: PendingChanges,
}

impl AssetIndex {
    pub fn new(paths: DataDirectories) -> Self {
        AssetIndex {
            paths,
            files: HashMap::new(),
            records: RecordArena::default(),
            record_keys: HashMap::new(),
            sub_assets: HashMap::new(),
            inverse_dependencies: InverseTable::default(),
            inverse_references: InverseTable::default(),
            unresolved_dependencies: UnresolvedEdges::default(),
            unresolved_references: UnresolvedEdges::default(),
            stale: StaleQueue::default(),
            in_flight: HashSet::new(),
            open_assets: HashSet::new(),
            pending: PendingChanges::default(),
        }
    }

    pub fn data_dirs(&self) -> &DataDirectories {
        &self.paths
    }

    // ---------------------------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------------------------

    pub fn file(&self, path: &Path) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &FileEntry)> {
        self.files.iter()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn asset_count(&self) -> usize {
        self.records.len()
    }

    pub fn asset_ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self.record_keys.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn records(&self) -> impl Iterator<Item = &AssetRecord> {
        self.records.iter().map(|(_, record)| record)
    }

    pub fn contains_asset(&self, id: AssetId) -> bool {
        self.record_keys.contains_key(&id)
    }

    /// Record owning `id`, where `id` is an asset identifier. Use [`Self::main_record_of`] to
    /// also accept sub-asset identifiers.
    pub fn get_asset_record(&self, id: AssetId) -> Option<&AssetRecord> {
        self.record_keys
            .get(&id)
            .and_then(|key| self.records.get(*key))
    }

    pub fn get_asset_record_mut(&mut self, id: AssetId) -> Option<&mut AssetRecord> {
        let key = *self.record_keys.get(&id)?;
        self.records.get_mut(key)
    }

    pub fn record_by_key(&self, key: RecordKey) -> Option<&AssetRecord> {
        self.records.get(key)
    }

    /// Record owning an asset or sub-asset identifier.
    pub fn main_record_of(&self, id: AssetId) -> Option<&AssetRecord> {
        self.get_asset_record(id).or_else(|| {
            self.sub_assets
                .get(&id)
                .and_then(|view| self.records.get(view.record))
        })
    }

    pub fn sub_asset(&self, id: AssetId) -> Option<&SubAssetView> {
        self.sub_assets.get(&id)
    }

    pub fn sub_assets(&self) -> &HashMap<AssetId, SubAssetView> {
        &self.sub_assets
    }

    pub fn record_of(&self, view: &SubAssetView) -> Option<&AssetRecord> {
        self.records.get(view.record)
    }

    pub fn asset_at_path(&self, path: &Path) -> Option<AssetId> {
        self.files
            .get(path)
            .and_then(|entry| entry.asset)
            .filter(|id| self.record_keys.contains_key(id))
    }

    pub fn dependents_of(&self, path: &Path) -> BTreeSet<AssetId> {
        self.inverse_dependencies.dependents(path).collect()
    }

    pub fn referencers_of(&self, path: &Path) -> BTreeSet<AssetId> {
        self.inverse_references.dependents(path).collect()
    }

    pub fn inverse_table(&self, kind: EdgeKind) -> &InverseTable {
        match kind {
            EdgeKind::Dependency => &self.inverse_dependencies,
            EdgeKind::Reference => &self.inverse_references,
        }
    }

    pub fn unresolved_edges(&self, kind: EdgeKind) -> &UnresolvedEdges {
        match kind {
            EdgeKind::Dependency => &self.unresolved_dependencies,
            EdgeKind::Reference => &self.unresolved_references,
        }
    }

    pub fn is_stale(&self, id: AssetId) -> bool {
        self.stale.contains(id)
    }

    pub fn stale_count(&self) -> usize {
        self.stale.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn generation(&self, id: AssetId) -> Option<u64> {
        self.main_record_of(id).map(|record| record.generation)
    }

    pub fn transform_state(&self, id: AssetId) -> Option<TransformState> {
        self.main_record_of(id).map(|record| record.state)
    }

    /// Resolves a declared dependency string from the point of view of an asset living in
    /// `owner_data_dir`.
    pub fn resolve_declared(&self, declared: &str, owner_data_dir: &Path) -> Resolution {
        if let Some(dep_id) = AssetId::parse(declared) {
            return match self.main_record_of(dep_id) {
                Some(record) => Resolution::Asset(record.id, record.absolute_path.clone()),
                None => Resolution::UnknownAsset(dep_id),
            };
        }
        let candidates = self.paths.candidates(declared, Some(owner_data_dir));
        for candidate in candidates.iter() {
            let known = self
                .files
                .get(candidate)
                .map(|entry| entry.exists())
                .unwrap_or(false);
            if known || candidate.is_file() {
                return match self.asset_at_path(candidate) {
                    Some(id) => Resolution::Asset(id, candidate.clone()),
                    None => Resolution::File(candidate.clone()),
                };
            }
        }
        Resolution::Missing(
            candidates
                .into_iter()
                .next()
                .unwrap_or_else(|| PathBuf::from(declared)),
        )
    }

    // ---------------------------------------------------------------------------------------
    // File entries
    // ---------------------------------------------------------------------------------------

    /// Confirms an unchanged file during a scan.
    pub(crate) fn confirm_file(&mut self, path: &Path) {
        if let Some(entry) = self.files.get_mut(path) {
            entry.status = FileStatus::Valid;
        }
    }

    /// Records a freshly observed file. `hash == None` means the file exists but could not be
    /// read. Dependents are invalidated when a known file's hash changed or it became readable
    /// again, and for files that were not known before only if `invalidate_new` is set.
    pub(crate) fn commit_file(
        &mut self,
        path: &Path,
        timestamp: FileTimestamp,
        hash: Option<u64>,
        invalidate_new: bool,
    ) -> FileChange {
        let entry = self.files.entry(path.to_path_buf()).or_default();
        let Some(hash) = hash else {
            tracing::warn!("[AssetIndex] {:?} is locked, hash unavailable", path);
            entry.status = FileStatus::Locked;
            entry.timestamp = FileTimestamp::invalid();
            return FileChange::Locked;
        };
        let was_locked = entry.status == FileStatus::Locked;
        let existed = entry.timestamp.is_valid() || was_locked;
        let changed = !existed || was_locked || entry.hash != hash;
        entry.timestamp = timestamp;
        entry.hash = hash;
        entry.status = FileStatus::Valid;
        if !changed {
            return FileChange::Unchanged;
        }
        if existed || invalidate_new {
            self.invalidate_dependents_of(path);
        }
        if existed {
            FileChange::Modified
        } else {
            FileChange::Added
        }
    }

    /// Handles a file that disappeared: flags the entry, removes the asset it was the source of
    /// and invalidates everything that depended on it.
    pub(crate) fn remove_file(&mut self, path: &Path) -> FileChange {
        let Some(entry) = self.files.get_mut(path) else {
            return FileChange::Unchanged;
        };
        let existed = entry.exists() || entry.timestamp.is_valid();
        entry.status = FileStatus::Unknown;
        entry.timestamp = FileTimestamp::invalid();
        entry.hash = 0;
        if let Some(id) = entry.asset.take() {
            self.remove_asset(id);
        }
        self.invalidate_dependents_of(path);
        if existed {
            FileChange::Removed
        } else {
            FileChange::Unchanged
        }
    }

    /// Start of a full scan. Returns the paths that were known to exist beforehand.
    pub(crate) fn mark_all_unknown(&mut self) -> HashSet<PathBuf> {
        let mut existing = HashSet::with_capacity(self.files.len());
        for (path, entry) in self.files.iter_mut() {
            if entry.exists() {
                existing.insert(path.clone());
            }
            if entry.status == FileStatus::Valid {
                entry.status = FileStatus::Unknown;
            }
        }
        for view in self.sub_assets.values_mut() {
            view.existence = ExistenceState::FileUnchanged;
        }
        existing
    }

    /// Entries still `Unknown` after a scan, excluding files outside every data directory.
    pub(crate) fn unknown_files(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|(_, entry)| entry.status == FileStatus::Unknown)
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// End of a full scan: drops entries that stayed `Unknown`. Returns how many of them had
    /// existed before the scan started.
    pub(crate) fn purge_unknown_files(&mut self, existed_before: &HashSet<PathBuf>) -> usize {
        let mut removed = 0;
        for path in self.unknown_files() {
            if existed_before.contains(&path) {
                tracing::info!("[AssetIndex] {:?} disappeared", path);
                self.remove_file(&path);
                removed += 1;
            }
            self.files.remove(&path);
        }
        removed
    }

    // ---------------------------------------------------------------------------------------
    // Asset records
    // ---------------------------------------------------------------------------------------

    /// Creates or updates the record for an asset source file. Handles new assets, assets whose
    /// file moved, changed headers, reclassified files and duplicate identifiers. Returns the
    /// asset id now linked to `path`.
    pub(crate) fn classify_asset(
        &mut self,
        path: &Path,
        header: AssetHeader,
        handler: Arc<dyn AssetTypeHandler>,
        content_changed: bool,
    ) -> Result<AssetId, CuratorError> {
        let data_dir = self
            .paths
            .data_dir_of(path)
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                CuratorError::NotFound(format!("{path:?} is not inside any data directory"))
            })?;
        let relative_path = self.paths.data_dir_relative(path).unwrap_or_default();
        let id = header.id;

        if let Some(previous) = self.files.get(path).and_then(|entry| entry.asset) {
            if previous != id {
                tracing::info!(
                    "[AssetIndex] {:?} changed identity from {} to {}",
                    path,
                    previous,
                    id
                );
                self.remove_asset(previous);
            }
        }

        let existing_path = self.get_asset_record(id).map(|r| r.absolute_path.clone());
        match existing_path {
            Some(existing_path) if existing_path != path => {
                let still_there = self
                    .files
                    .get(&existing_path)
                    .map(|entry| entry.exists())
                    .unwrap_or(false)
                    && existing_path.is_file();
                if still_there {
                    tracing::error!(
                        "[AssetIndex] Asset id {} of {:?} is already used by {:?}, ignoring the duplicate",
                        id,
                        path,
                        existing_path
                    );
                    if let Some(entry) = self.files.get_mut(path) {
                        entry.asset = None;
                    }
                    return Err(CuratorError::Custom(format!(
                        "duplicate asset id {id} in {path:?} (already used by {existing_path:?})"
                    )));
                }
                tracing::info!(
                    "[AssetIndex] Asset {} moved from {:?} to {:?}",
                    id,
                    existing_path,
                    path
                );
                if let Some(entry) = self.files.get_mut(&existing_path) {
                    entry.asset = None;
                }
                let mut old_dependents = self.dependents_of(&existing_path);
                old_dependents.extend(self.referencers_of(&existing_path));
                self.untrack(id);
                if let Some(record) = self.get_asset_record_mut(id) {
                    record.absolute_path = path.to_path_buf();
                    record.data_dir = data_dir;
                    record.relative_path = relative_path;
                    record.header = header;
                    record.handler = handler;
                }
                self.track(id);
                for dependent in old_dependents {
                    self.retrack(dependent);
                }
                self.update_sub_assets(id, ExistenceState::FileModified);
                self.invalidate_asset_transform_state(id);
            }
            Some(_) => {
                let header_changed = self
                    .get_asset_record(id)
                    .map(|record| record.header != header)
                    .unwrap_or(true);
                if content_changed || header_changed {
                    self.untrack(id);
                    if let Some(record) = self.get_asset_record_mut(id) {
                        record.header = header;
                        record.handler = handler;
                    }
                    self.track(id);
                    self.update_sub_assets(id, ExistenceState::FileModified);
                    self.invalidate_asset_transform_state(id);
                }
            }
            None => {
                tracing::debug!("[AssetIndex] New asset {} at {:?}", id, path);
                let record = AssetRecord::new(
                    path.to_path_buf(),
                    data_dir,
                    relative_path,
                    header,
                    handler,
                );
                let key = self.records.insert(record);
                self.record_keys.insert(id, key);
                self.track(id);
                self.update_sub_assets(id, ExistenceState::FileAdded);
                self.resolve_unresolved(id);
                self.invalidate_asset_transform_state(id);
            }
        }

        self.files.entry(path.to_path_buf()).or_default().asset = Some(id);
        Ok(id)
    }

    /// Destroys a record with all of its sub-asset views. Dependents are re-tracked (assets that
    /// referenced it by identifier become unresolved again) and invalidated.
    pub(crate) fn remove_asset(&mut self, id: AssetId) -> Option<AssetRecord> {
        let path = self.get_asset_record(id)?.absolute_path.clone();
        let mut dependents = self.dependents_of(&path);
        dependents.extend(self.referencers_of(&path));

        self.untrack(id);
        let key = self.record_keys.remove(&id)?;
        let record = self.records.remove(key)?;
        for sub_id in record.sub_assets.iter().chain(std::iter::once(&id)) {
            if let Some(mut view) = self.sub_assets.remove(sub_id) {
                view.existence = ExistenceState::FileRemoved;
                self.pending.record(*sub_id, ChangeKind::Removed, view);
            }
        }
        self.stale.remove(id);
        self.in_flight.remove(&id);
        self.open_assets.remove(&id);
        if let Some(entry) = self.files.get_mut(&path) {
            if entry.asset == Some(id) {
                entry.asset = None;
            }
        }
        tracing::debug!("[AssetIndex] Removed asset {} ({:?})", id, path);

        for dependent in dependents {
            if dependent != id {
                self.retrack(dependent);
                self.invalidate_asset_transform_state(dependent);
            }
        }
        Some(record)
    }

    fn update_sub_assets(&mut self, id: AssetId, existence: ExistenceState) {
        let Some(&key) = self.record_keys.get(&id) else {
            return;
        };
        let Some(record) = self.records.get(key) else {
            return;
        };
        let mut views = vec![(
            id,
            SubAssetView::main(record.display_name(), &record.header.type_name, key),
        )];
        for descriptor in record.header.sub_assets.iter().filter(|d| d.id != id) {
            views.push((
                descriptor.id,
                SubAssetView::sub(&descriptor.name, &descriptor.type_name, key),
            ));
        }
        let previous = record.sub_assets.clone();
        let current: BTreeSet<AssetId> = views.iter().skip(1).map(|(sub_id, _)| *sub_id).collect();

        for (sub_id, mut view) in views {
            let kind = match self.sub_assets.get(&sub_id) {
                Some(old) => {
                    view.last_access = old.last_access;
                    view.existence = existence;
                    ChangeKind::Updated
                }
                None => {
                    view.existence = ExistenceState::FileAdded;
                    ChangeKind::Added
                }
            };
            self.sub_assets.insert(sub_id, view.clone());
            self.pending.record(sub_id, kind, view);
        }
        for removed in previous.difference(&current) {
            if let Some(mut view) = self.sub_assets.remove(removed) {
                view.existence = ExistenceState::FileRemoved;
                self.pending.record(*removed, ChangeKind::Removed, view);
            }
        }
        if let Some(record) = self.records.get_mut(key) {
            record.sub_assets = current;
        }
    }

    // ---------------------------------------------------------------------------------------
    // Inverse tables
    // ---------------------------------------------------------------------------------------

    fn table_mut(&mut self, kind: EdgeKind) -> (&mut InverseTable, &mut UnresolvedEdges) {
        match kind {
            EdgeKind::Dependency => (
                &mut self.inverse_dependencies,
                &mut self.unresolved_dependencies,
            ),
            EdgeKind::Reference => (
                &mut self.inverse_references,
                &mut self.unresolved_references,
            ),
        }
    }

    /// Registers the record's declared dependencies and references in the inverse tables.
    fn track(&mut self, id: AssetId) {
        let Some(record) = self.get_asset_record(id) else {
            return;
        };
        let data_dir = record.data_dir.clone();
        let declared = [
            (EdgeKind::Dependency, record.header.dependencies.clone()),
            (EdgeKind::Reference, record.header.references.clone()),
        ];
        let mut tracked = TrackedFiles::default();
        for (kind, entries) in declared {
            for entry in entries.iter().filter(|e| !e.trim().is_empty()) {
                let resolution = self.resolve_declared(entry, &data_dir);
                let (table, unresolved) = self.table_mut(kind);
                match resolution {
                    Resolution::Asset(_, path)
                    | Resolution::File(path)
                    | Resolution::Missing(path) => {
                        table.add(&path, id);
                        match kind {
                            EdgeKind::Dependency => tracked.dependencies.insert(path),
                            EdgeKind::Reference => tracked.references.insert(path),
                        };
                    }
                    Resolution::UnknownAsset(dependency) => unresolved.insert(id, dependency),
                }
            }
        }
        if let Some(record) = self.get_asset_record_mut(id) {
            record.tracked = tracked;
        }
    }

    fn untrack(&mut self, id: AssetId) {
        let Some(record) = self.get_asset_record_mut(id) else {
            return;
        };
        let tracked = std::mem::take(&mut record.tracked);
        for path in tracked.dependencies.iter() {
            self.inverse_dependencies.remove(path, id);
        }
        for path in tracked.references.iter() {
            self.inverse_references.remove(path, id);
        }
        self.unresolved_dependencies.forget_dependent(id);
        self.unresolved_references.forget_dependent(id);
    }

    fn retrack(&mut self, id: AssetId) {
        self.untrack(id);
        self.track(id);
    }

    /// Connects dependents that declared `id` before it was indexed.
    fn resolve_unresolved(&mut self, id: AssetId) {
        let Some(path) = self.get_asset_record(id).map(|r| r.absolute_path.clone()) else {
            return;
        };
        for kind in [EdgeKind::Dependency, EdgeKind::Reference] {
            let waiting = {
                let (table, unresolved) = self.table_mut(kind);
                let waiting = unresolved.take_waiting_on(id);
                for dependent in waiting.iter() {
                    table.add(&path, *dependent);
                }
                waiting
            };
            for dependent in waiting {
                if let Some(record) = self.get_asset_record_mut(dependent) {
                    match kind {
                        EdgeKind::Dependency => record.tracked.dependencies.insert(path.clone()),
                        EdgeKind::Reference => record.tracked.references.insert(path.clone()),
                    };
                }
                tracing::debug!(
                    "[AssetIndex] Resolved {} {} of {}",
                    kind,
                    id,
                    dependent
                );
                self.invalidate_asset_transform_state(dependent);
            }
        }
    }

    // ---------------------------------------------------------------------------------------
    // Transform state
    // ---------------------------------------------------------------------------------------

    fn record_state_event(&mut self, id: AssetId) {
        if let Some(view) = self.sub_assets.get(&id) {
            self.pending.record(id, ChangeKind::Updated, view.clone());
        }
    }

    /// Forces `id` and, transitively, every asset depending on or referencing it back to
    /// `Unknown` and queues them for an update.
    pub fn invalidate_asset_transform_state(&mut self, id: AssetId) {
        let mut todo = vec![id];
        let mut visited = HashSet::new();
        while let Some(current) = todo.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(record) = self.get_asset_record_mut(current) else {
                continue;
            };
            record.generation += 1;
            record.asset_hash = 0;
            record.thumb_hash = 0;
            let was = std::mem::replace(&mut record.state, TransformState::Unknown);
            let path = record.absolute_path.clone();
            self.stale.push(current);
            if was != TransformState::Unknown {
                self.record_state_event(current);
            }
            todo.extend(self.inverse_dependencies.dependents(&path));
            todo.extend(self.inverse_references.dependents(&path));
        }
    }

    pub(crate) fn invalidate_dependents_of(&mut self, path: &Path) {
        let mut dependents = self.dependents_of(path);
        dependents.extend(self.referencers_of(path));
        for dependent in dependents {
            self.invalidate_asset_transform_state(dependent);
        }
    }

    /// Writes a state directly. `TransformError` invalidates all dependents, `Unknown`
    /// invalidates the asset itself.
    pub fn set_asset_transform_state(&mut self, id: AssetId, state: TransformState) {
        let Some(record) = self.get_asset_record_mut(id) else {
            return;
        };
        let changed = record.state != state;
        record.state = state;
        record.generation += 1;
        let path = record.absolute_path.clone();
        self.stale.remove(id);
        if changed {
            self.record_state_event(id);
        }
        match state {
            TransformState::TransformError => self.invalidate_dependents_of(&path),
            TransformState::Unknown => self.invalidate_asset_transform_state(id),
            _ => {}
        }
    }

    /// Applies a computed state if the record's generation still equals `generation`.
    pub fn commit_transform_state(
        &mut self,
        id: AssetId,
        generation: u64,
        update: StateUpdate,
    ) -> CommitOutcome {
        let Some(record) = self.get_asset_record_mut(id) else {
            return CommitOutcome::Discarded(TransformState::Unknown);
        };
        if record.generation != generation {
            tracing::debug!(
                "[AssetIndex] Discarding stale state {} for {} (generation {} != {})",
                update.state,
                id,
                generation,
                record.generation
            );
            return CommitOutcome::Discarded(record.state);
        }
        let changed = record.state != update.state
            || record.asset_hash != update.asset_hash
            || record.thumb_hash != update.thumb_hash;
        record.state = update.state;
        record.asset_hash = update.asset_hash;
        record.thumb_hash = update.thumb_hash;
        record.missing_dependencies = update.missing_dependencies;
        record.missing_references = update.missing_references;
        record.generation += 1;
        self.stale.remove(id);
        if changed {
            self.record_state_event(id);
        }
        CommitOutcome::Applied(update.state)
    }

    /// Stores the log of the last processing attempt.
    pub(crate) fn set_log(&mut self, id: AssetId, log: Vec<crate::properties::LogEntry>) {
        if let Some(record) = self.get_asset_record_mut(id) {
            record.log = log;
        }
    }

    /// Bulk invalidation of every asset currently in `state`. Returns how many were hit.
    pub fn invalidate_assets_with_transform_state(&mut self, state: TransformState) -> usize {
        let hits: Vec<AssetId> = self
            .records()
            .filter(|record| record.state == state)
            .map(|record| record.id)
            .collect();
        for id in hits.iter() {
            self.invalidate_asset_transform_state(*id);
        }
        hits.len()
    }

    pub fn transform_stats(&self) -> BTreeMap<TransformState, usize> {
        let mut stats: BTreeMap<TransformState, usize> =
            TransformState::ALL.iter().map(|state| (*state, 0)).collect();
        for record in self.records() {
            *stats.entry(record.state).or_default() += 1;
        }
        stats
    }

    // ---------------------------------------------------------------------------------------
    // Scheduling
    // ---------------------------------------------------------------------------------------

    /// Marks an asset as open in an editor. Open assets are updated before all others.
    pub fn set_asset_open(&mut self, id: AssetId, open: bool) {
        if open {
            self.open_assets.insert(id);
            self.update_asset_last_access_time(id);
        } else {
            self.open_assets.remove(&id);
        }
    }

    /// Stamps the view's access time. This is a write and requires the exclusive lock.
    pub fn update_asset_last_access_time(&mut self, id: AssetId) -> bool {
        match self.sub_assets.get_mut(&id) {
            Some(view) => {
                view.last_access = Some(SystemTime::now());
                true
            }
            None => false,
        }
    }

    fn next_candidate(&self) -> Option<AssetId> {
        let last_access = |id: &AssetId| self.sub_assets.get(id).and_then(|v| v.last_access);
        let open = self
            .stale
            .iter()
            .filter(|id| self.open_assets.contains(id) && !self.in_flight.contains(id))
            .max_by_key(last_access);
        open.or_else(|| self.stale.iter().find(|id| !self.in_flight.contains(id)))
    }

    /// Highest priority stale asset without claiming it.
    pub fn get_next_asset_to_update(&self) -> Option<(AssetId, PathBuf)> {
        let id = self.next_candidate()?;
        self.get_asset_record(id)
            .map(|record| (id, record.absolute_path.clone()))
    }

    /// Claims the highest priority stale asset for a worker. The asset stays in the stale queue
    /// until its state is committed but is skipped by other workers until
    /// [`Self::finish_update`].
    pub(crate) fn take_next_asset_to_update(&mut self) -> Option<(AssetId, PathBuf)> {
        loop {
            let id = self.next_candidate()?;
            match self.get_asset_record(id) {
                Some(record) => {
                    let path = record.absolute_path.clone();
                    self.in_flight.insert(id);
                    return Some((id, path));
                }
                None => {
                    self.stale.remove(id);
                }
            }
        }
    }

    pub(crate) fn finish_update(&mut self, id: AssetId) {
        self.in_flight.remove(&id);
    }

    /// Releases a claimed asset whose update failed. It is retried on its next invalidation.
    pub(crate) fn abandon_update(&mut self, id: AssetId) {
        self.in_flight.remove(&id);
        self.stale.remove(id);
    }

    // ---------------------------------------------------------------------------------------
    // Events and lifecycle
    // ---------------------------------------------------------------------------------------

    pub(crate) fn reset_list(&mut self) {
        self.pending.reset_list();
    }

    pub(crate) fn has_pending_events(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drains the changes collected since the last call, with views refreshed to their current
    /// contents.
    pub fn take_events(&mut self) -> Vec<CuratorEvent> {
        self.pending
            .take()
            .into_iter()
            .map(|event| match event {
                CuratorEvent::AssetAdded(id, view) => {
                    let view = self.sub_assets.get(&id).cloned().unwrap_or(view);
                    CuratorEvent::AssetAdded(id, view)
                }
                CuratorEvent::AssetUpdated(id, view) => {
                    let view = self.sub_assets.get(&id).cloned().unwrap_or(view);
                    CuratorEvent::AssetUpdated(id, view)
                }
                other => other,
            })
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.files.clear();
        self.records.clear();
        self.record_keys.clear();
        self.sub_assets.clear();
        self.inverse_dependencies.clear();
        self.inverse_references.clear();
        self.unresolved_dependencies.clear();
        self.unresolved_references.clear();
        self.stale.clear();
        self.in_flight.clear();
        self.open_assets.clear();
        self.pending = PendingChanges::default();
    }
}
