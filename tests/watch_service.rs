//! Integration tests for the directory watcher (requires the `service` feature).

#![cfg(feature = "service")]

mod common;

use asset_curator::{event::CuratorEvent, properties::AssetId};
use common::{manifest, TestProject};
use std::{
    fs::remove_file,
    time::{Duration, Instant},
};

const WAIT: Duration = Duration::from_secs(10);

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}

#[test]
fn watcher_picks_up_new_and_removed_assets() {
    let project = TestProject::new();
    let curator = project.curator(project.config());
    let events = curator.subscribe();
    curator.enable_watcher().unwrap();
    assert!(curator.is_watching());

    project.write("dropped.asset", &manifest(None, &[], &[], &[]));
    let id = AssetId::from_relative_path("dropped.asset");
    assert!(wait_until(|| curator.read_index().contains_asset(id)));

    remove_file(project.path("dropped.asset")).unwrap();
    assert!(wait_until(|| !curator.read_index().contains_asset(id)));

    let events: Vec<CuratorEvent> = events.try_iter().collect();
    assert!(events
        .iter()
        .any(|event| matches!(event, CuratorEvent::AssetAdded(added, _) if *added == id)));
    assert!(events
        .iter()
        .any(|event| matches!(event, CuratorEvent::AssetRemoved(removed, _) if *removed == id)));

    curator.disable_watcher();
    assert!(!curator.is_watching());
}

#[test]
fn cache_folder_writes_are_ignored() {
    let project = TestProject::new();
    let curator = project.curator(project.config());
    curator.enable_watcher().unwrap();

    project.write("AssetCache/scratch.asset", &manifest(None, &[], &[], &[]));
    project.write("real.asset", &manifest(None, &[], &[], &[]));
    let real = AssetId::from_relative_path("real.asset");
    assert!(wait_until(|| curator.read_index().contains_asset(real)));
    assert_eq!(curator.read_index().asset_count(), 1);
    assert!(curator
        .read_index()
        .file(&project.path("AssetCache/scratch.asset"))
        .is_none());
}
