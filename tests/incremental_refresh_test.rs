//! Change detection: deletions, modifications, additions, and the
//! unchanged-tree no-op law.

use cppscope::indexing::CppIndexer;
use cppscope::search::SearchFilters;
use std::fs;
use tempfile::TempDir;

#[test]
fn unchanged_tree_refreshes_nothing() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.cpp"), "class A {};\n").unwrap();

    let indexer = CppIndexer::new(dir.path()).unwrap();
    indexer.index_project(true, None, None).unwrap();

    let refresh = indexer.refresh_if_needed(None).unwrap();
    assert_eq!(refresh.refreshed_files(), 0);
    assert_eq!(refresh.modified, 0);
    assert_eq!(refresh.added, 0);
    assert_eq!(refresh.deleted, 0);
}

#[test]
fn deleted_file_vanishes_from_every_index() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(
        root.join("x.cpp"),
        "class X {};\nvoid helper() {}\nvoid user() { helper(); }\n",
    )
    .unwrap();
    fs::write(root.join("keep.cpp"), "class Keep {};\n").unwrap();

    let indexer = CppIndexer::new(root).unwrap();
    indexer.index_project(true, None, None).unwrap();
    assert_eq!(
        indexer
            .search_classes("X", &SearchFilters::default())
            .unwrap()
            .total,
        1
    );

    fs::remove_file(root.join("x.cpp")).unwrap();
    let refresh = indexer.refresh_if_needed(None).unwrap();
    assert_eq!(refresh.deleted, 1);

    // Symbols, file entries and call edges are gone.
    assert_eq!(
        indexer
            .search_classes("X", &SearchFilters::default())
            .unwrap()
            .total,
        0
    );
    let by_file = indexer.find_in_file("x.cpp", "").unwrap();
    assert!(by_file.files.is_empty());
    assert!(indexer.find_callers("helper", None, true).is_err());

    // The untouched file is unaffected.
    assert_eq!(
        indexer
            .search_classes("Keep", &SearchFilters::default())
            .unwrap()
            .total,
        1
    );
}

#[test]
fn modified_file_replaces_its_symbols() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("m.cpp"), "class Old {};\n").unwrap();

    let indexer = CppIndexer::new(root).unwrap();
    indexer.index_project(true, None, None).unwrap();
    assert_eq!(
        indexer
            .search_classes("Old", &SearchFilters::default())
            .unwrap()
            .total,
        1
    );

    fs::write(root.join("m.cpp"), "class New {};\n").unwrap();
    let refresh = indexer.refresh_if_needed(None).unwrap();
    assert_eq!(refresh.modified, 1);

    assert_eq!(
        indexer
            .search_classes("Old", &SearchFilters::default())
            .unwrap()
            .total,
        0,
        "stale symbols are purged before re-insert"
    );
    assert_eq!(
        indexer
            .search_classes("New", &SearchFilters::default())
            .unwrap()
            .total,
        1
    );
}

#[test]
fn added_file_is_picked_up() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("first.cpp"), "class First {};\n").unwrap();

    let indexer = CppIndexer::new(root).unwrap();
    indexer.index_project(true, None, None).unwrap();

    fs::write(root.join("second.cpp"), "class Second {};\n").unwrap();
    let refresh = indexer.refresh_if_needed(None).unwrap();
    assert_eq!(refresh.added, 1);
    assert_eq!(
        indexer
            .search_classes("Second", &SearchFilters::default())
            .unwrap()
            .total,
        1
    );
}

#[test]
fn modified_header_is_reextracted() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("api.h"), "class Api {};\n").unwrap();
    fs::write(root.join("use.cpp"), "#include \"api.h\"\nint main() { return 0; }\n").unwrap();

    let indexer = CppIndexer::new(root).unwrap();
    indexer.index_project(true, None, None).unwrap();
    assert_eq!(
        indexer
            .search_classes("Api", &SearchFilters::default())
            .unwrap()
            .total,
        1
    );

    fs::write(root.join("api.h"), "class Api {};\nclass Extra {};\n").unwrap();
    let refresh = indexer.refresh_if_needed(None).unwrap();
    assert!(refresh.modified >= 1);

    assert_eq!(
        indexer
            .search_classes("Extra", &SearchFilters::default())
            .unwrap()
            .total,
        1,
        "new symbols in the modified header are indexed"
    );
}

#[test]
fn warm_start_restores_index_from_cache() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("w.cpp"), "class Warm {};\nvoid f() {}\nvoid g() { f(); }\n").unwrap();

    {
        let indexer = CppIndexer::new(root).unwrap();
        indexer.index_project(true, None, None).unwrap();
    }

    // A fresh process-equivalent: new indexer over the same cache.
    let indexer = CppIndexer::new(root).unwrap();
    assert!(indexer.cache_loaded());
    assert_eq!(
        indexer
            .search_classes("Warm", &SearchFilters::default())
            .unwrap()
            .total,
        1
    );
    // The call graph is rebuilt from persisted edges.
    let callers = indexer.find_callers("f", None, false).unwrap();
    assert_eq!(callers.callers.len(), 1);
    assert_eq!(callers.callers[0].name, "g");

    // And a refresh on the unchanged tree does nothing.
    let refresh = indexer.refresh_if_needed(None).unwrap();
    assert_eq!(refresh.refreshed_files(), 0);
}
