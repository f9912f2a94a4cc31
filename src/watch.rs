//! # Directory Watching (requires the `service` feature)
//!
//! [`AssetWatcher`] feeds file-system notifications for every data directory into
//! [`CuratorCore::notify_of_file_change`]. Events are debounced by `notify-debouncer-full`; the
//! debouncer thread takes the index lock like any other caller but never waits on an update
//! worker, and wakes the workers once the changed paths are indexed.
//!
//! ```rust,no_run
//! # #[cfg(feature = "service")]
//! # fn example() -> Result<(), asset_curator::CuratorError> {
//! use asset_curator::{config::CuratorConfig, curator::Curator, handler::HandlerRegistry};
//!
//! let curator = Curator::new(CuratorConfig::new(&["/project/Assets"]), HandlerRegistry::create())?;
//! curator.initialize()?;
//! curator.enable_watcher()?;
//! for event in curator.subscribe() {
//!     println!("{event}");
//! }
//! # Ok(())
//! # }
//! ```

use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, Debouncer, FileIdMap,
};
use parking_lot::Mutex;
use std::{collections::BTreeSet, path::PathBuf, sync::Arc, time::Duration};

use crate::{curator::CuratorCore, error::CuratorError};

/// Quiet period before a burst of notifications is handed to the curator.
pub const DEBOUNCE_TIMEOUT: Duration = Duration::from_millis(300);

type DirectoryWatcher = Debouncer<RecommendedWatcher, FileIdMap>;

pub struct AssetWatcher {
    debouncer: Mutex<DirectoryWatcher>,
    roots: Vec<PathBuf>,
}

impl AssetWatcher {
    pub(crate) fn new(core: Arc<CuratorCore>) -> Result<Self, CuratorError> {
        let handler_core = core.clone();
        let mut debouncer = new_debouncer(
            DEBOUNCE_TIMEOUT,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let mut changed = BTreeSet::new();
                    for event in events.iter() {
                        match event.event.kind {
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                                changed.extend(
                                    event
                                        .paths
                                        .iter()
                                        .filter(|p| !handler_core.data_dirs().is_ignored(p))
                                        .cloned(),
                                );
                            }
                            _ => {}
                        }
                    }
                    if changed.is_empty() {
                        return;
                    }
                    tracing::info!("[AssetWatcher] {} paths changed", changed.len());
                    for path in changed {
                        if let Err(e) = handler_core.notify_of_file_change(&path) {
                            tracing::warn!("[AssetWatcher] Failed to update {:?}: {}", path, e);
                        }
                    }
                }
                Err(errors) => {
                    tracing::error!("[AssetWatcher] Notify debouncer returned errors: {:?}", errors);
                }
            },
        )?;

        let roots: Vec<PathBuf> = core.data_dirs().iter().cloned().collect();
        for root in roots.iter() {
            debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
            tracing::debug!("[AssetWatcher] Watching {:?}", root);
        }
        Ok(AssetWatcher {
            debouncer: Mutex::new(debouncer),
            roots,
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub(crate) fn stop(self) {
        let mut debouncer = self.debouncer.lock();
        for root in self.roots.iter() {
            if let Err(e) = debouncer.watcher().unwatch(root) {
                tracing::debug!("[AssetWatcher] Unwatch {:?} failed: {}", root, e);
            }
        }
    }
}
