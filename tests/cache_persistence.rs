//! The scan cache lets a restarted curator skip re-reading unchanged sources.

mod common;

use asset_curator::{
    cache::{cache_file, load_cache, CACHE_VERSION},
    curator::Curator,
    properties::AssetId,
};
use common::{bump_mtime, CountingHandler, TestProject};
use std::{fs::write, sync::Arc};

fn session(project: &TestProject, handler: &Arc<CountingHandler>) -> Curator {
    let config = project.config().with_cache(true);
    let curator = Curator::new(config, handler.registry()).unwrap();
    curator.initialize().unwrap();
    curator
}

fn populate(project: &TestProject) {
    project.write("t.png", "t");
    project.write_manifest("one.asset", None, &["t.png"], &[]);
    project.write_manifest("two.asset", None, &[], &["one.asset"]);
}

#[test]
fn unchanged_sources_are_not_parsed_again() {
    let project = TestProject::new();
    populate(&project);

    let first = Arc::new(CountingHandler::default());
    session(&project, &first).deinitialize();
    assert_eq!(first.parse_count(), 2);
    let cached = load_cache(&project.data_dir).unwrap();
    assert_eq!(cached.len(), 3);
    assert!(cached[&project.path("one.asset")].header.is_some());
    assert!(cached[&project.path("t.png")].header.is_none());

    let second = Arc::new(CountingHandler::default());
    let curator = session(&project, &second);
    assert_eq!(second.parse_count(), 0);
    assert_eq!(curator.read_index().asset_count(), 2);
    assert!(curator
        .read_index()
        .dependents_of(&project.path("t.png"))
        .contains(&AssetId::from_relative_path("one.asset")));
}

#[test]
fn modified_sources_bypass_the_cache() {
    let project = TestProject::new();
    populate(&project);
    let first = Arc::new(CountingHandler::default());
    session(&project, &first).deinitialize();

    project.write_manifest("two.asset", None, &["t.png"], &[]);
    bump_mtime(&project.path("two.asset"));

    let second = Arc::new(CountingHandler::default());
    let curator = session(&project, &second);
    assert_eq!(second.parse_count(), 1);
    assert!(curator
        .read_index()
        .dependents_of(&project.path("t.png"))
        .contains(&AssetId::from_relative_path("two.asset")));
}

#[test]
fn outdated_or_corrupt_caches_are_ignored() {
    let project = TestProject::new();
    populate(&project);
    let first = Arc::new(CountingHandler::default());
    session(&project, &first).deinitialize();

    let path = cache_file(&project.data_dir);
    write(
        &path,
        format!("{{\"version\": {}, \"files\": {{}}}}", CACHE_VERSION + 1),
    )
    .unwrap();
    assert!(load_cache(&project.data_dir).is_err());
    let second = Arc::new(CountingHandler::default());
    session(&project, &second).deinitialize();
    assert_eq!(second.parse_count(), 2);

    write(&path, "not json").unwrap();
    let third = Arc::new(CountingHandler::default());
    let curator = session(&project, &third);
    assert_eq!(third.parse_count(), 2);
    assert_eq!(curator.read_index().asset_count(), 2);
}
