//! Background update workers.
//!
//! Each worker is a task on the curator's runtime that waits on the shared work notifier, then
//! drains the stale queue one asset at a time. The actual work (hashing, handler calls) runs on
//! tokio's blocking pool through [`CuratorCore::run_next_update_task`]. A finished task simply
//! asks for the next one, so the pool size bounds the number of assets updated concurrently.
//!
//! Shutdown stops handing out new tasks; tasks that already started run to completion.

use parking_lot::Mutex;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{runtime::Runtime, task::JoinHandle, time::timeout};

use crate::{curator::CuratorCore, properties::AssetId};

/// Upper bound on how long an idle worker sleeps without a notification.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// A worker's claim on one stale asset. Dropping an unsettled claim, e.g. while a panicking
/// handler unwinds, abandons the update so the asset is not skipped forever.
struct UpdateClaim<'a> {
    core: &'a CuratorCore,
    id: AssetId,
    settled: bool,
}

impl UpdateClaim<'_> {
    fn finish(mut self) {
        self.core.index.write().finish_update(self.id);
        self.settled = true;
    }

    fn abandon(mut self) {
        self.core.index.write().abandon_update(self.id);
        self.settled = true;
    }
}

impl Drop for UpdateClaim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::error!("[UpdateScheduler] Update of {} aborted, releasing it", self.id);
            self.core.index.write().abandon_update(self.id);
        }
    }
}

impl CuratorCore {
    /// Claims the highest priority stale asset, recomputes its state and, with
    /// `auto_transform`, processes it if the new state asks for it. Returns `false` when nothing
    /// was pending.
    pub fn run_next_update_task(&self) -> bool {
        let next: Option<(AssetId, PathBuf)> = self.index.write().take_next_asset_to_update();
        let Some((id, path)) = next else {
            return false;
        };
        let claim = UpdateClaim {
            core: self,
            id,
            settled: false,
        };
        tracing::debug!("[UpdateScheduler] Updating {:?}", path);
        let result = self.update_transform_state(id, false).and_then(|state| {
            if self.config.auto_transform && state.needs_processing() {
                self.process_asset(id, Default::default())
            } else {
                Ok(state)
            }
        });
        match result {
            Ok(state) => {
                tracing::trace!("[UpdateScheduler] {:?} is {}", path, state);
                claim.finish();
            }
            Err(e) => {
                tracing::warn!("[UpdateScheduler] Update of {:?} failed: {}", path, e);
                claim.abandon();
            }
        }
        self.flush_events();
        true
    }
}

pub struct UpdateScheduler {
    core: Arc<CuratorCore>,
    worker_count: usize,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl UpdateScheduler {
    pub(crate) fn new(core: Arc<CuratorCore>, worker_count: usize) -> Self {
        UpdateScheduler {
            core,
            worker_count,
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Nothing stale, nothing claimed, no task running.
    pub fn is_idle(&self) -> bool {
        let index = self.core.index.read();
        self.active.load(Ordering::SeqCst) == 0
            && index.stale_count() == 0
            && index.in_flight_count() == 0
    }

    pub(crate) fn start(&self, runtime: &Runtime) {
        if self.worker_count == 0 || self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("[UpdateScheduler] Starting {} workers", self.worker_count);
        let mut handles = self.handles.lock();
        for worker in 0..self.worker_count {
            let core = self.core.clone();
            let running = self.running.clone();
            let paused = self.paused.clone();
            let active = self.active.clone();
            let notifier = self.core.work_notifier.clone();
            handles.push(runtime.spawn(async move {
                tracing::debug!("[UpdateScheduler] Worker {} started", worker);
                loop {
                    // Registered before checking for work so a notification sent while draining
                    // is not lost.
                    let notified = notifier.notified();
                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                    loop {
                        if !running.load(Ordering::Acquire) || paused.load(Ordering::SeqCst) {
                            break;
                        }
                        // Pairs with `pause`: either it sees this task as active or this
                        // check sees the pause.
                        active.fetch_add(1, Ordering::SeqCst);
                        if paused.load(Ordering::SeqCst) {
                            active.fetch_sub(1, Ordering::SeqCst);
                            break;
                        }
                        let task_core = core.clone();
                        let worked =
                            tokio::task::spawn_blocking(move || task_core.run_next_update_task())
                                .await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        match worked {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => {
                                tracing::error!("[UpdateScheduler] Update task panicked: {}", e);
                                break;
                            }
                        }
                    }
                    let _ = timeout(IDLE_POLL, notified).await;
                }
                tracing::debug!("[UpdateScheduler] Worker {} stopped", worker);
            }));
        }
        drop(handles);
        self.core.work_notifier.notify_waiters();
    }

    /// Stops handing out tasks and waits until running tasks finished. Used around full scans.
    pub(crate) fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        while self.active.load(Ordering::SeqCst) > 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    pub(crate) fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.core.work_notifier.notify_waiters();
    }

    /// Stops all workers. Running tasks finish, queued ones stay queued.
    pub(crate) fn shutdown(&self, runtime: &Runtime) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.core.work_notifier.notify_waiters();
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = runtime.block_on(handle) {
                tracing::warn!("[UpdateScheduler] Worker ended abnormally: {}", e);
            }
        }
        tracing::info!("[UpdateScheduler] Stopped");
    }
}
