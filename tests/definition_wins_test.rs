//! A class declared in one header and defined in another is reported once,
//! at the definition, while the declaring header stays populated.

use cppscope::indexing::CppIndexer;
use cppscope::search::SearchFilters;
use std::fs;
use tempfile::TempDir;

fn write(root: &std::path::Path, name: &str, content: &str) {
    fs::write(root.join(name), content).unwrap();
}

#[test]
fn definition_supersedes_forward_declaration() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(root, "a.h", "class Q;\n");
    write(root, "b.h", "class Q {\n    int x;\n};\n");
    write(
        root,
        "main.cpp",
        "#include \"a.h\"\n#include \"b.h\"\nint main() { return 0; }\n",
    );

    let indexer = CppIndexer::new(root).unwrap();
    let stats = indexer.index_project(true, None, None).unwrap();
    assert_eq!(stats.failed, 0);

    let outcome = indexer
        .search_classes("Q", &SearchFilters::default())
        .unwrap();
    assert_eq!(outcome.total, 1, "exactly one surviving record for Q");
    let q = &outcome.symbols[0];
    assert!(q.is_definition);
    assert!(q.file.ends_with("b.h"));
    assert_eq!(q.start_line, 1);
    assert_eq!(q.end_line, 3);

    // The declaring header keeps its entry in the file index.
    let in_a = indexer.find_in_file("a.h", "Q").unwrap();
    assert_eq!(in_a.files.len(), 1);
    assert_eq!(in_a.files[0].symbols.len(), 1);
    assert!(!in_a.files[0].symbols[0].is_definition);
}

#[test]
fn method_defined_out_of_line_reports_both_locations() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(
        root,
        "widget.h",
        "class Widget {\npublic:\n    void draw(int scale) const;\n};\n",
    );
    write(
        root,
        "widget.cpp",
        "#include \"widget.h\"\nvoid Widget::draw(int scale) const {\n    (void)scale;\n}\n",
    );

    let indexer = CppIndexer::new(root).unwrap();
    indexer.index_project(true, None, None).unwrap();

    let outcome = indexer
        .search_functions("draw", &SearchFilters::default())
        .unwrap();
    assert_eq!(outcome.total, 1);
    let draw = &outcome.symbols[0];
    assert!(draw.is_definition);
    assert!(draw.file.ends_with("widget.cpp"));
    assert_eq!(
        draw.header_file.as_deref().map(|f| f.ends_with("widget.h")),
        Some(true),
        "definition mirrors the declaring header"
    );
    assert_eq!(draw.parent_class, "Widget");
    assert!(draw.is_const);

    // The header still lists the declaration.
    let in_header = indexer.find_in_file("widget.h", "draw").unwrap();
    assert_eq!(in_header.files.len(), 1);
    assert_eq!(in_header.files[0].symbols.len(), 1);
}

#[test]
fn reindex_without_changes_is_all_cache_hits() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "x.cpp", "class X {};\nvoid f() {}\n");

    let indexer = CppIndexer::new(root).unwrap();
    let first = indexer.index_project(true, None, None).unwrap();
    assert_eq!(first.indexed, 1);

    let second = indexer.index_project(false, None, None).unwrap();
    assert_eq!(second.indexed, 0);
    assert_eq!(second.cache_hits, 1);
    assert_eq!(second.failed, 0);

    // Symbols are still there.
    let outcome = indexer
        .search_classes("X", &SearchFilters::default())
        .unwrap();
    assert_eq!(outcome.total, 1);
}
