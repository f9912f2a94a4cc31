//! Full file system checks must only report what actually changed on disk.

mod common;

use asset_curator::{
    event::CuratorEvent,
    properties::{AssetId, TransformFlags, TransformState},
};
use common::{bump_mtime, TestProject};
use std::fs::{remove_file, rename};

fn populated() -> TestProject {
    let project = TestProject::new();
    project.write("textures/a.png", "a");
    project.write("textures/b.png", "b");
    project.write_manifest("a.asset", None, &["textures/a.png"], &[]);
    project.write_manifest("b.asset", None, &["textures/b.png"], &["a.asset"]);
    project.write(".hidden/c.asset", "dependencies = []");
    project
}

#[test]
fn repeated_checks_find_nothing_new() {
    let project = populated();
    let curator = project.curator(project.config());
    assert_eq!(curator.read_index().asset_count(), 2);
    let files = curator.read_index().file_count();

    assert_eq!(curator.check_file_system().unwrap(), 0);
    assert_eq!(curator.check_file_system().unwrap(), 0);
    assert_eq!(curator.read_index().file_count(), files);
}

#[test]
fn touching_a_file_without_changing_it_keeps_states() {
    let project = populated();
    let curator = project.curator(project.config());
    let a = AssetId::from_relative_path("a.asset");
    curator.process_asset(a, TransformFlags::empty()).unwrap();
    assert_eq!(curator.transform_state(a), Some(TransformState::UpToDate));

    bump_mtime(&project.path("textures/a.png"));
    bump_mtime(&project.path("a.asset"));
    assert_eq!(curator.check_file_system().unwrap(), 0);
    assert_eq!(curator.transform_state(a), Some(TransformState::UpToDate));
    assert!(!curator.read_index().is_stale(a));
}

#[test]
fn removed_and_renamed_files_are_reconciled() {
    let project = populated();
    let curator = project.curator(project.config());
    let events = curator.subscribe();
    let a = AssetId::from_relative_path("a.asset");
    let b = AssetId::from_relative_path("b.asset");

    remove_file(project.path("textures/b.png")).unwrap();
    rename(project.path("a.asset"), project.path("renamed.asset")).unwrap();
    assert!(curator.check_file_system().unwrap() > 0);

    let index = curator.read_index();
    assert!(index.file(&project.path("textures/b.png")).is_none());
    assert!(!index.contains_asset(a));
    assert!(index.contains_asset(AssetId::from_relative_path("renamed.asset")));
    assert_eq!(index.transform_state(b), Some(TransformState::Unknown));
    drop(index);

    let events: Vec<CuratorEvent> = events.try_iter().collect();
    assert!(events.contains(&CuratorEvent::AssetListReset));
    assert!(events
        .iter()
        .any(|event| matches!(event, CuratorEvent::AssetRemoved(id, _) if *id == a)));
    assert_eq!(
        curator.update_transform_state(b, false).unwrap(),
        TransformState::MissingDependency
    );
}
