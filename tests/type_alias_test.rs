//! Type-alias tracking and resolution.

use cppscope::indexing::CppIndexer;
use cppscope::indexing::indexer::TypeAliasInfo;
use std::fs;
use tempfile::TempDir;

fn index_single(code: &str) -> (TempDir, CppIndexer) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.cpp"), code).unwrap();
    let indexer = CppIndexer::new(dir.path()).unwrap();
    let stats = indexer.index_project(true, None, None).unwrap();
    assert_eq!(stats.failed, 0);
    (dir, indexer)
}

#[test]
fn alias_resolves_to_canonical_class() {
    let (_dir, indexer) = index_single(
        "class Widget {};\n\
         typedef Widget WidgetT;\n\
         using Handle = Widget;\n",
    );

    match indexer.get_type_alias_info("Handle").unwrap() {
        TypeAliasInfo::Resolved {
            canonical_type,
            is_definition,
            aliases,
            ..
        } => {
            assert_eq!(canonical_type, "Widget");
            assert!(is_definition);
            let names: Vec<&str> = aliases.iter().map(|a| a.alias_name.as_str()).collect();
            assert!(names.contains(&"WidgetT"));
            assert!(names.contains(&"Handle"));
        }
        other => panic!("expected resolution, got {other:?}"),
    }
}

#[test]
fn typedef_chain_resolves_transitively() {
    let (_dir, indexer) = index_single(
        "class Core {};\n\
         typedef Core Level1;\n\
         typedef Level1 Level2;\n",
    );

    match indexer.get_type_alias_info("Level2").unwrap() {
        TypeAliasInfo::Resolved { canonical_type, .. } => {
            assert_eq!(canonical_type, "Core");
        }
        other => panic!("expected resolution, got {other:?}"),
    }
}

#[test]
fn ambiguous_name_lists_candidates() {
    let (_dir, indexer) = index_single(
        "namespace a {\nclass View {};\n}\nnamespace b {\nclass View {};\n}\n",
    );

    match indexer.get_type_alias_info("View").unwrap() {
        TypeAliasInfo::Ambiguous { candidates, .. } => {
            assert_eq!(candidates, vec!["a::View", "b::View"]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[test]
fn unknown_name_is_not_found() {
    let (_dir, indexer) = index_single("class Real {};\n");
    assert!(matches!(
        indexer.get_type_alias_info("Imaginary").unwrap(),
        TypeAliasInfo::NotFound { .. }
    ));
}

#[test]
fn template_alias_is_recorded() {
    let (_dir, indexer) = index_single(
        "template <typename T> class Box { T value; };\n\
         template <typename T> using BoxRef = Box<T>;\n",
    );

    // The alias rows land in the cache with template metadata.
    let aliases = indexer.cache().aliases_by_name("BoxRef").unwrap();
    assert_eq!(aliases.len(), 1);
    assert!(aliases[0].is_template_alias);
    assert_eq!(aliases[0].template_params.len(), 1);
    assert_eq!(aliases[0].target_type, "Box<T>");
}
