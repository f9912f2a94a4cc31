//! End-to-end scenarios for the curator with the built-in manifest handler.
//!
//! Each test builds a throwaway data directory, runs the curator against it without background
//! workers and checks the observable outcome: transform states, files written below
//! `AssetCache/`, lookup tables and change events.

mod common;

use asset_curator::{
    event::CuratorEvent,
    properties::{AssetId, TransformFlags, TransformState},
};
use common::{manifest, TestProject};
use std::fs::{read_to_string, remove_file, write};
use test_log::test;

#[test]
fn texture_change_requires_a_new_transform() {
    let project = TestProject::new();
    project.write("textures/rock.png", "rock pixels");
    project.write_manifest("meshes/rock.asset", None, &["textures/rock.png"], &[]);
    let curator = project.curator(project.config());
    let mesh = curator
        .find_sub_asset("meshes/rock.asset", false)
        .map(|view| view.id())
        .unwrap();

    assert_eq!(
        curator.update_transform_state(mesh, false).unwrap(),
        TransformState::NeedsTransform
    );
    assert_eq!(
        curator.process_asset(mesh, TransformFlags::empty()).unwrap(),
        TransformState::UpToDate
    );
    assert!(project
        .path("AssetCache/Default/meshes/rock.asset.json")
        .is_file());
    assert!(project
        .path("AssetCache/Thumbnails/meshes/rock.thumb.json")
        .is_file());

    project.write("textures/rock.png", "mossy rock pixels");
    curator
        .notify_of_file_change(&project.path("textures/rock.png"))
        .unwrap();
    assert_eq!(curator.transform_state(mesh), Some(TransformState::Unknown));
    assert_eq!(
        curator.update_transform_state(mesh, false).unwrap(),
        TransformState::NeedsTransform
    );
}

#[test]
fn reference_changes_only_touch_the_thumbnail() {
    let project = TestProject::new();
    project.write_manifest("materials/stone.asset", None, &[], &[]);
    project.write_manifest("meshes/wall.asset", None, &[], &["materials/stone.asset"]);
    let curator = project.curator(project.config());
    let wall = AssetId::from_relative_path("meshes/wall.asset");

    assert_eq!(
        curator.process_asset(wall, TransformFlags::empty()).unwrap(),
        TransformState::UpToDate
    );

    project.write(
        "materials/stone.asset",
        &manifest(None, &[], &[], &["Variant"]),
    );
    curator
        .notify_of_file_change(&project.path("materials/stone.asset"))
        .unwrap();
    assert_eq!(
        curator.update_transform_state(wall, false).unwrap(),
        TransformState::NeedsThumbnail
    );
}

#[test]
fn states_survive_a_restart() {
    let project = TestProject::new();
    project.write("a.png", "a");
    project.write_manifest("a.asset", None, &["a.png"], &[]);
    let id = AssetId::from_relative_path("a.asset");
    {
        let curator = project.curator(project.config());
        curator.process_asset(id, TransformFlags::empty()).unwrap();
        assert_eq!(curator.transform_state(id), Some(TransformState::UpToDate));
    }

    // Identical inputs hash identically in a fresh session, so the recorded outputs still match.
    let curator = project.curator(project.config());
    assert_eq!(
        curator.update_transform_state(id, false).unwrap(),
        TransformState::UpToDate
    );
}

#[test]
fn deleting_a_dependency_reports_it_missing() {
    let project = TestProject::new();
    project.write("a.png", "a");
    project.write_manifest("a.asset", None, &["a.png"], &[]);
    let curator = project.curator(project.config());
    let id = AssetId::from_relative_path("a.asset");
    curator.process_asset(id, TransformFlags::empty()).unwrap();

    remove_file(project.path("a.png")).unwrap();
    curator.notify_of_file_change(&project.path("a.png")).unwrap();
    assert_eq!(
        curator.update_transform_state(id, false).unwrap(),
        TransformState::MissingDependency
    );
    let missing = curator
        .read_index()
        .get_asset_record(id)
        .map(|record| record.missing_dependencies.clone())
        .unwrap();
    assert!(missing.contains("a.png"));

    // Restoring the exact bytes brings back the recorded hash.
    project.write("a.png", "a");
    curator.notify_of_file_change(&project.path("a.png")).unwrap();
    assert_eq!(
        curator.update_transform_state(id, false).unwrap(),
        TransformState::UpToDate
    );
}

#[test]
fn dependencies_declared_by_id_resolve_late() {
    let project = TestProject::new();
    let texture_set = AssetId::new();
    project.write_manifest("mesh.asset", None, &[&texture_set.to_string()], &[]);
    let curator = project.curator(project.config());
    let mesh = AssetId::from_relative_path("mesh.asset");
    assert_eq!(
        curator.update_transform_state(mesh, false).unwrap(),
        TransformState::MissingDependency
    );

    project.write_manifest("textures/set.asset", Some(texture_set), &[], &[]);
    curator
        .notify_of_file_change(&project.path("textures/set.asset"))
        .unwrap();
    assert!(curator.read_index().is_stale(mesh));
    assert_eq!(
        curator.process_asset(mesh, TransformFlags::empty()).unwrap(),
        TransformState::UpToDate
    );
    assert_eq!(
        curator.transform_state(texture_set),
        Some(TransformState::UpToDate)
    );
    assert_eq!(curator.find_all_uses(texture_set, false), vec![mesh]);
}

#[test]
fn transform_all_writes_lookup_tables() {
    let project = TestProject::new();
    project.write("t.png", "t");
    project.write("ok.asset", &manifest(None, &["t.png"], &[], &["LOD0"]));
    project.write_manifest("broken.asset", None, &["missing.png"], &[]);
    let curator = project.curator(project.config());

    let summary = curator.transform_all_assets(TransformFlags::empty()).unwrap();
    assert_eq!(summary.up_to_date, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    let ok = AssetId::from_relative_path("ok.asset");
    let table = read_to_string(project.path("AssetCache/Default.assettable")).unwrap();
    assert!(table.contains(&format!("{ok};AssetCache/Default/ok.asset\n")));
    assert!(table.contains(&format!(
        "{};AssetCache/Default/ok.asset|LOD0\n",
        ok.sub_asset("LOD0")
    )));
    assert_eq!(table.lines().count(), 3);
}

#[test]
fn new_files_are_announced_to_subscribers() {
    let project = TestProject::new();
    let curator = project.curator(project.config());
    let events = curator.subscribe();

    project.write("prop.asset", &manifest(None, &[], &[], &["Collision"]));
    curator
        .notify_of_file_change(&project.path("prop.asset"))
        .unwrap();
    let prop = AssetId::from_relative_path("prop.asset");
    let added: Vec<AssetId> = events
        .try_iter()
        .filter_map(|event| match event {
            CuratorEvent::AssetAdded(id, _) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(added.len(), 2);
    assert!(added.contains(&prop));
    assert!(added.contains(&prop.sub_asset("Collision")));

    // The table picks the new asset up on the next tick.
    curator.main_thread_tick();
    let table = read_to_string(project.path("AssetCache/Default.assettable")).unwrap();
    assert!(table.contains(&prop.to_string()));
}

#[test]
fn unreadable_descriptors_do_not_become_assets() {
    let project = TestProject::new();
    project.write("bad.asset", "dependencies = [");
    let curator = project.curator(project.config());
    assert_eq!(curator.read_index().asset_count(), 0);
    assert!(curator.read_index().file(&project.path("bad.asset")).is_some());

    write(project.path("bad.asset"), "dependencies = []").unwrap();
    curator
        .notify_of_file_change(&project.path("bad.asset"))
        .unwrap();
    assert_eq!(curator.read_index().asset_count(), 1);
}

#[test]
fn best_match_and_cycle_checks_go_through_the_index() {
    let project = TestProject::new();
    project.write("textures/grass.png", "g");
    project.write_manifest("base.asset", None, &[], &[]);
    project.write_manifest("top.asset", None, &["base.asset"], &[]);
    let curator = project.curator(project.config());

    assert_eq!(
        curator.find_best_match_for_file("grass", &["png", "tga"]).unwrap(),
        "textures/grass.png"
    );
    let base = AssetId::from_relative_path("base.asset");
    let top = AssetId::from_relative_path("top.asset");
    assert!(curator.would_create_cycle(base, top));
    assert!(!curator.would_create_cycle(top, base));
}
