use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    sync::mpsc::{channel, Receiver, Sender},
};

use crate::{index::SubAssetView, properties::AssetId};

/// Change notifications broadcast after every committed mutation of the asset index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CuratorEvent {
    AssetAdded(AssetId, SubAssetView),
    AssetRemoved(AssetId, SubAssetView),
    AssetUpdated(AssetId, SubAssetView),
    /// Full rescan boundary, listeners should re-query everything they display.
    AssetListReset,
    /// Name of the newly active platform profile.
    ActivePlatformChanged(String),
}

impl CuratorEvent {
    pub fn asset_id(&self) -> Option<AssetId> {
        match self {
            CuratorEvent::AssetAdded(id, _)
            | CuratorEvent::AssetRemoved(id, _)
            | CuratorEvent::AssetUpdated(id, _) => Some(*id),
            _ => None,
        }
    }
}

impl Display for CuratorEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CuratorEvent::AssetAdded(id, view) => write!(f, "added {} ({id})", view.name),
            CuratorEvent::AssetRemoved(id, view) => write!(f, "removed {} ({id})", view.name),
            CuratorEvent::AssetUpdated(id, view) => write!(f, "updated {} ({id})", view.name),
            CuratorEvent::AssetListReset => write!(f, "asset list reset"),
            CuratorEvent::ActivePlatformChanged(name) => {
                write!(f, "active platform changed to {name}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// Sub-asset changes collected while the index lock is held, flushed as events afterwards.
///
/// Multiple changes to the same sub-asset between two flushes collapse into one:
/// added then updated stays added, added then removed vanishes, removed then added becomes an
/// update, and anything followed by a removal is a removal.
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    changes: BTreeMap<AssetId, (ChangeKind, SubAssetView)>,
    list_reset: bool,
}

impl PendingChanges {
    pub fn record(&mut self, id: AssetId, kind: ChangeKind, view: SubAssetView) {
        let merged = match (self.changes.get(&id).map(|(k, _)| *k), kind) {
            (None, kind) => Some(kind),
            (Some(ChangeKind::Added), ChangeKind::Removed) => None,
            (Some(ChangeKind::Added), _) => Some(ChangeKind::Added),
            (Some(ChangeKind::Removed), ChangeKind::Added) => Some(ChangeKind::Updated),
            (Some(_), ChangeKind::Removed) => Some(ChangeKind::Removed),
            (Some(prev), ChangeKind::Updated) => Some(prev),
            (Some(ChangeKind::Updated), ChangeKind::Added) => Some(ChangeKind::Updated),
        };
        match merged {
            Some(kind) => {
                self.changes.insert(id, (kind, view));
            }
            None => {
                self.changes.remove(&id);
            }
        }
    }

    pub fn reset_list(&mut self) {
        self.list_reset = true;
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && !self.list_reset
    }

    /// Drains the collected changes. Sub-asset events come first, the reset marker last.
    pub fn take(&mut self) -> Vec<CuratorEvent> {
        let mut events: Vec<CuratorEvent> = std::mem::take(&mut self.changes)
            .into_iter()
            .map(|(id, (kind, view))| match kind {
                ChangeKind::Added => CuratorEvent::AssetAdded(id, view),
                ChangeKind::Updated => CuratorEvent::AssetUpdated(id, view),
                ChangeKind::Removed => CuratorEvent::AssetRemoved(id, view),
            })
            .collect();
        if std::mem::take(&mut self.list_reset) {
            events.push(CuratorEvent::AssetListReset);
        }
        events
    }
}

/// Fan-out of curator events to any number of `mpsc` listeners. Listeners whose receiver was
/// dropped are pruned on the next broadcast.
#[derive(Debug, Default)]
pub struct EventBus {
    listeners: Mutex<Vec<Sender<CuratorEvent>>>,
}

impl EventBus {
    pub fn subscribe(&self) -> Receiver<CuratorEvent> {
        let (tx, rx) = channel();
        self.listeners.lock().push(tx);
        rx
    }

    pub fn add_listener(&self, tx: Sender<CuratorEvent>) {
        self.listeners.lock().push(tx);
    }

    pub fn broadcast(&self, event: CuratorEvent) {
        tracing::debug!("[EventBus] {}", event);
        self.listeners
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}
