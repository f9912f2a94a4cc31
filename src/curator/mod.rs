//! # Curator
//!
//! [`Curator`] is the explicit context object of the asset pipeline. It is constructed once by
//! the hosting editor with a [`CuratorConfig`] and a [`HandlerRegistry`] and passed by reference
//! to every caller; there is no global instance.
//!
//! ## Lifecycle
//!
//! ```rust,no_run
//! use asset_curator::{config::CuratorConfig, curator::Curator, handler::HandlerRegistry};
//!
//! let config = CuratorConfig::new(&["/project/Assets"]);
//! let curator = Curator::new(config, HandlerRegistry::create())?;
//!
//! // Scans every data directory on a background task; the caller keeps running.
//! curator.start_initialize();
//! // ... later, before the first query:
//! curator.wait_for_initialize()?;
//!
//! let events = curator.subscribe();
//! if let Some(view) = curator.find_sub_asset("meshes/rock.asset", true) {
//!     println!("{} is {}", view.name, view.record().map(|r| r.state).unwrap_or_default());
//! }
//! curator.deinitialize();
//! # Ok::<(), asset_curator::CuratorError>(())
//! ```
//!
//! ## Threading
//!
//! All index access goes through one `parking_lot::RwLock<AssetIndex>` held by [`CuratorCore`].
//! The caller's thread, the [`UpdateScheduler`] workers and (with the `service` feature) the file
//! watcher thread all share it. Hashing and handler invocations run with the lock released; their
//! results are committed together with the generation counter captured beforehand, so a result
//! computed against an index state that has since changed is dropped.
//!
//! Change events are collected while the lock is held and broadcast afterwards by
//! [`CuratorCore::flush_events`]; listeners never run under the index lock.

use parking_lot::{
    MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::{
    collections::{BTreeMap, HashMap},
    ops::Deref,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Receiver,
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::{runtime::Runtime, sync::Notify, task::JoinHandle};

use crate::{
    asset_table::{render_asset_table, table_path, write_if_changed},
    cache::{load_cache, save_cache, CachedFile},
    config::{CuratorConfig, PlatformProfile},
    error::CuratorError,
    event::{CuratorEvent, EventBus},
    graph::AssetGraph,
    handler::HandlerRegistry,
    index::{AssetIndex, AssetRecord, SubAssetView},
    paths::DataDirectories,
    properties::{AssetId, TransformState},
    scheduler::UpdateScheduler,
};

#[cfg(feature = "service")]
use crate::watch::AssetWatcher;

mod process;
mod scanner;
mod state;

pub use process::TransformSummary;

/// State shared between the caller, the update workers and the file watcher.
pub struct CuratorCore {
    pub(crate) index: RwLock<AssetIndex>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) config: CuratorConfig,
    pub(crate) paths: DataDirectories,
    pub(crate) events: EventBus,
    /// Wakes idle update workers.
    pub(crate) work_notifier: Arc<Notify>,
    active_profile: RwLock<usize>,
    /// Snapshot loaded by [`CuratorCore::load_caches`], consumed by the first full scan.
    file_cache: Mutex<HashMap<PathBuf, CachedFile>>,
    initial_scan: AtomicBool,
    tables_dirty: AtomicBool,
    initialized: AtomicBool,
}

impl CuratorCore {
    fn new(config: CuratorConfig, handlers: HandlerRegistry) -> Self {
        let paths = DataDirectories::new(&config.data_dirs);
        let active_profile = config.active_profile_index();
        CuratorCore {
            index: RwLock::new(AssetIndex::new(paths.clone())),
            handlers,
            paths,
            events: EventBus::default(),
            work_notifier: Arc::new(Notify::new()),
            active_profile: RwLock::new(active_profile),
            file_cache: Mutex::new(HashMap::new()),
            initial_scan: AtomicBool::new(false),
            tables_dirty: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    pub fn data_dirs(&self) -> &DataDirectories {
        &self.paths
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Loads caches, scans all data directories and writes the asset tables.
    fn initialize(&self) -> Result<(), CuratorError> {
        let started = Instant::now();
        tracing::info!(
            "[Curator] Initializing with {} data directories",
            self.paths.len()
        );
        if self.config.cache_enabled {
            self.load_caches();
        }
        self.initial_scan.store(true, Ordering::Release);
        let scan = self.reconcile_file_system();
        self.initial_scan.store(false, Ordering::Release);
        self.file_cache.lock().clear();
        let changes = scan?;
        self.initialized.store(true, Ordering::Release);
        self.write_asset_tables(false)?;
        self.flush_events();
        tracing::info!(
            "[Curator] Initialized {} assets ({} file changes) in {:?}",
            self.index.read().asset_count(),
            changes,
            started.elapsed()
        );
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Index access
    // ---------------------------------------------------------------------------------------

    pub fn read_index(&self) -> RwLockReadGuard<'_, AssetIndex> {
        self.index.read()
    }

    pub fn write_index(&self) -> RwLockWriteGuard<'_, AssetIndex> {
        self.index.write()
    }

    /// Looks up an asset or sub-asset by identifier or path and returns it together with the
    /// read lock that keeps it alive. Do not hold the handle across calls that modify the index.
    pub fn find_sub_asset(&self, path_or_id: &str, exhaustive: bool) -> Option<LockedSubAsset<'_>> {
        let guard = self.index.read();
        let id = guard.find_sub_asset_id(path_or_id, exhaustive)?;
        Some(LockedSubAsset { guard, id })
    }

    pub fn get_sub_asset(&self, id: AssetId) -> Option<LockedSubAsset<'_>> {
        let guard = self.index.read();
        guard.sub_asset(id)?;
        Some(LockedSubAsset { guard, id })
    }

    pub fn get_known_sub_assets(&self) -> MappedRwLockReadGuard<'_, HashMap<AssetId, SubAssetView>> {
        RwLockReadGuard::map(self.index.read(), |index| index.sub_assets())
    }

    pub fn transform_state(&self, id: AssetId) -> Option<TransformState> {
        self.index.read().transform_state(id)
    }

    pub fn find_all_uses(&self, id: AssetId, transitive: bool) -> Vec<AssetId> {
        self.index
            .read()
            .find_all_uses(id, transitive)
            .into_iter()
            .collect()
    }

    pub fn would_create_cycle(&self, id: AssetId, candidate: AssetId) -> bool {
        self.index.read().would_create_cycle(id, candidate)
    }

    pub fn find_best_match_for_file(
        &self,
        candidate: &str,
        allowed_extensions: &[&str],
    ) -> Result<String, CuratorError> {
        self.index
            .read()
            .find_best_match_for_file(candidate, allowed_extensions)
    }

    /// Stamps the access time used to prioritize open assets. Takes the write lock.
    pub fn update_asset_last_access_time(&self, id: AssetId) -> bool {
        self.index.write().update_asset_last_access_time(id)
    }

    pub fn set_asset_open(&self, id: AssetId, open: bool) {
        self.index.write().set_asset_open(id, open);
        if open {
            self.wake_workers();
        }
    }

    pub fn get_next_asset_to_update(&self) -> Option<(AssetId, PathBuf)> {
        self.index.read().get_next_asset_to_update()
    }

    pub fn get_asset_transform_stats(&self) -> BTreeMap<TransformState, usize> {
        self.index.read().transform_stats()
    }

    /// Forces every asset in `state` back to `Unknown`, e.g. to retry all failed transforms.
    pub fn invalidate_assets_with_transform_state(&self, state: TransformState) -> usize {
        let count = self
            .index
            .write()
            .invalidate_assets_with_transform_state(state);
        self.flush_events();
        self.wake_workers();
        count
    }

    pub fn dependency_graph(&self) -> AssetGraph {
        AssetGraph::from_index(&self.index.read())
    }

    /// Writes the asset graph in Graphviz format, limited to what `root` uses when given.
    pub fn write_dependency_graph(
        &self,
        root: Option<AssetId>,
        path: &Path,
    ) -> Result<(), CuratorError> {
        let graph = self.dependency_graph();
        let dot = match root {
            Some(id) => graph.reachable_from(id).to_dot(),
            None => graph.to_dot(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, dot)?;
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------------------------

    pub fn subscribe(&self) -> Receiver<CuratorEvent> {
        self.events.subscribe()
    }

    /// Broadcasts the changes collected since the last flush.
    pub fn flush_events(&self) {
        let events = self.index.write().take_events();
        for event in events {
            if matches!(
                event,
                CuratorEvent::AssetAdded(..) | CuratorEvent::AssetRemoved(..)
            ) {
                self.tables_dirty.store(true, Ordering::Release);
            }
            self.events.broadcast(event);
        }
    }

    pub(crate) fn wake_workers(&self) {
        self.work_notifier.notify_waiters();
    }

    /// Periodic housekeeping for the host's main loop: flushes events and rewrites the asset
    /// tables if the set of assets changed.
    pub fn main_thread_tick(&self) {
        self.flush_events();
        if self.is_initialized() && self.tables_dirty.load(Ordering::Acquire) {
            if let Err(e) = self.write_asset_tables(false) {
                tracing::warn!("[Curator] Failed to write asset tables: {}", e);
            }
        }
    }

    // ---------------------------------------------------------------------------------------
    // Platform profiles
    // ---------------------------------------------------------------------------------------

    pub fn profiles(&self) -> &[PlatformProfile] {
        &self.config.profiles
    }

    pub fn active_profile(&self) -> PlatformProfile {
        let index = *self.active_profile.read();
        self.config.profiles[index].clone()
    }

    /// Switches the target platform. All transform states are invalidated since output hashes
    /// depend on the profile.
    pub fn set_active_profile(&self, name: &str) -> Result<(), CuratorError> {
        let position = self
            .config
            .profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| CuratorError::NotFound(format!("platform profile '{name}'")))?;
        {
            let mut active = self.active_profile.write();
            if *active == position {
                return Ok(());
            }
            *active = position;
        }
        tracing::info!("[Curator] Active platform profile is now '{}'", name);
        {
            let mut index = self.index.write();
            for id in index.asset_ids() {
                index.invalidate_asset_transform_state(id);
            }
        }
        self.tables_dirty.store(true, Ordering::Release);
        self.flush_events();
        self.events
            .broadcast(CuratorEvent::ActivePlatformChanged(name.to_string()));
        self.wake_workers();
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------------------

    /// Loads the scan cache of every data directory. Unreadable or outdated caches are dropped.
    pub fn load_caches(&self) -> usize {
        let mut cache = self.file_cache.lock();
        for dir in self.paths.iter() {
            match load_cache(dir) {
                Ok(entries) => {
                    tracing::debug!("[Curator] Loaded {} cached entries for {:?}", entries.len(), dir);
                    cache.extend(entries);
                }
                Err(e) => {
                    tracing::warn!("[Curator] Dropping scan cache of {:?}: {}", dir, e);
                }
            }
        }
        cache.len()
    }

    /// Cached snapshot for `path`, trusted only during the initial scan and only while the
    /// timestamp on disk still matches.
    pub(crate) fn take_cached(
        &self,
        path: &Path,
        timestamp: crate::properties::FileTimestamp,
    ) -> Option<CachedFile> {
        if !self.initial_scan.load(Ordering::Acquire) {
            return None;
        }
        self.file_cache
            .lock()
            .remove(path)
            .filter(|cached| cached.timestamp == timestamp && timestamp.is_valid())
    }

    /// Writes the scan cache of every data directory. Failures are logged, not returned; the
    /// next session rescans instead.
    pub fn save_caches(&self) -> usize {
        let index = self.index.read();
        let mut saved = 0;
        for dir in self.paths.iter() {
            let entries: Vec<(&Path, CachedFile)> = index
                .files()
                .filter(|(path, entry)| {
                    entry.status == crate::properties::FileStatus::Valid
                        && self.paths.data_dir_of(path) == Some(dir.as_path())
                })
                .map(|(path, entry)| {
                    let header = entry
                        .asset
                        .and_then(|id| index.get_asset_record(id))
                        .map(|record| record.header.clone());
                    (
                        path.as_path(),
                        CachedFile {
                            timestamp: entry.timestamp,
                            hash: entry.hash,
                            header,
                        },
                    )
                })
                .collect();
            match save_cache(dir, entries) {
                Ok(count) => saved += count,
                Err(e) => tracing::warn!("[Curator] Failed to save scan cache of {:?}: {}", dir, e),
            }
        }
        saved
    }

    /// Rewrites the lookup table of every data directory for the active profile. Returns how many
    /// tables were written.
    pub fn write_asset_tables(&self, force: bool) -> Result<usize, CuratorError> {
        let profile = self.active_profile();
        self.tables_dirty.store(false, Ordering::Release);
        let tables: Vec<(PathBuf, String)> = {
            let index = self.index.read();
            self.paths
                .iter()
                .map(|dir| {
                    (
                        table_path(dir, &profile),
                        render_asset_table(&index, dir, &profile),
                    )
                })
                .collect()
        };
        let mut written = 0;
        for (path, content) in tables {
            if write_if_changed(&path, &content, force)? {
                written += 1;
            }
        }
        Ok(written)
    }

    fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        if self.config.cache_enabled {
            self.save_caches();
        }
        if self.tables_dirty.load(Ordering::Acquire) {
            if let Err(e) = self.write_asset_tables(false) {
                tracing::warn!("[Curator] Failed to write asset tables: {}", e);
            }
        }
        self.flush_events();
        self.index.write().clear();
        tracing::info!("[Curator] Deinitialized");
    }
}

/// A sub-asset view together with the read lock that keeps it valid.
pub struct LockedSubAsset<'a> {
    guard: RwLockReadGuard<'a, AssetIndex>,
    id: AssetId,
}

impl LockedSubAsset<'_> {
    pub fn id(&self) -> AssetId {
        self.id
    }

    /// The record owning this sub-asset.
    pub fn record(&self) -> Option<&AssetRecord> {
        self.guard.main_record_of(self.id)
    }

    pub fn index(&self) -> &AssetIndex {
        &self.guard
    }
}

impl Deref for LockedSubAsset<'_> {
    type Target = SubAssetView;

    fn deref(&self) -> &SubAssetView {
        self.guard
            .sub_asset(self.id)
            .expect("sub-asset views cannot disappear while the read lock is held")
    }
}

/// The curator context. Owns the async runtime, the update workers and the optional watcher.
/// Everything else is reachable through [`CuratorCore`], which `Curator` dereferences to.
pub struct Curator {
    core: Arc<CuratorCore>,
    scheduler: UpdateScheduler,
    init_handle: Mutex<Option<JoinHandle<Result<(), CuratorError>>>>,
    #[cfg(feature = "service")]
    watcher: Mutex<Option<AssetWatcher>>,
    runtime: Runtime,
}

impl Curator {
    pub fn new(config: CuratorConfig, handlers: HandlerRegistry) -> Result<Self, CuratorError> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_count.max(1))
            .thread_name("asset-curator")
            .enable_all()
            .build()?;
        let worker_count = config.worker_count;
        let core = Arc::new(CuratorCore::new(config, handlers));
        let scheduler = UpdateScheduler::new(core.clone(), worker_count);
        Ok(Curator {
            core,
            scheduler,
            init_handle: Mutex::new(None),
            #[cfg(feature = "service")]
            watcher: Mutex::new(None),
            runtime,
        })
    }

    pub fn core(&self) -> &Arc<CuratorCore> {
        &self.core
    }

    /// Starts the initial scan on a background task and returns immediately.
    pub fn start_initialize(&self) {
        let mut handle = self.init_handle.lock();
        if handle.is_some() || self.core.is_initialized() {
            return;
        }
        let core = self.core.clone();
        *handle = Some(self.runtime.spawn_blocking(move || core.initialize()));
    }

    /// Blocks until the initial scan finished, then starts the update workers. Must not be called
    /// from within an async context.
    pub fn wait_for_initialize(&self) -> Result<(), CuratorError> {
        let handle = self.init_handle.lock().take();
        if let Some(handle) = handle {
            self.runtime.block_on(handle)??;
        }
        if !self.core.is_initialized() {
            return Err(CuratorError::Service(
                "wait_for_initialize called before start_initialize".to_string(),
            ));
        }
        self.scheduler.start(&self.runtime);
        Ok(())
    }

    pub fn initialize(&self) -> Result<(), CuratorError> {
        self.start_initialize();
        self.wait_for_initialize()
    }

    /// Stops the watcher and the workers (letting running tasks finish), saves the caches and
    /// tables and clears the index. Called on drop if still initialized.
    pub fn deinitialize(&self) {
        #[cfg(feature = "service")]
        self.disable_watcher();
        if let Some(handle) = self.init_handle.lock().take() {
            if let Err(e) = self.runtime.block_on(handle) {
                tracing::warn!("[Curator] Initialization task failed: {}", e);
            }
        }
        self.scheduler.shutdown(&self.runtime);
        self.core.shutdown();
    }

    /// Full reconciliation with the file system. Update workers are paused for the duration.
    pub fn check_file_system(&self) -> Result<usize, CuratorError> {
        self.scheduler.pause();
        let result = self.core.reconcile_file_system();
        self.core.flush_events();
        self.scheduler.resume();
        result
    }

    /// Blocks until no asset is stale or being updated, or `timeout` elapsed. Returns whether
    /// the index is settled. Without workers the pending updates run on the calling thread.
    pub fn wait_for_updates(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        if self.scheduler.worker_count() == 0 {
            while self.core.run_next_update_task() {
                if Instant::now() >= deadline {
                    return false;
                }
            }
            return true;
        }
        loop {
            if self.scheduler.is_idle() {
                self.core.flush_events();
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    /// Starts watching every data directory for changes.
    #[cfg(feature = "service")]
    pub fn enable_watcher(&self) -> Result<(), CuratorError> {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            return Ok(());
        }
        *watcher = Some(AssetWatcher::new(self.core.clone())?);
        Ok(())
    }

    #[cfg(feature = "service")]
    pub fn disable_watcher(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    #[cfg(feature = "service")]
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }
}

impl Deref for Curator {
    type Target = CuratorCore;

    fn deref(&self) -> &CuratorCore {
        &self.core
    }
}

impl Drop for Curator {
    fn drop(&mut self) {
        self.deinitialize();
    }
}
