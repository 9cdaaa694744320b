//! Template-aware derived-class discovery, end to end.

use cppscope::indexing::CppIndexer;
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
fn plain_and_qualified_inheritance() {
    let (_dir, indexer) = index_single(
        "class Base {};\n\
         class Child : public Base {};\n\
         namespace ns {\nclass Grand : public ::Base {};\n}\n\
         class Stranger {};\n",
    );

    let derived = indexer.get_derived_classes("Base", false).unwrap();
    let names: Vec<&str> = derived.iter().map(|s| s.qualified_name.as_str()).collect();
    assert_eq!(names, vec!["Child", "ns::Grand"]);
}

#[test]
fn crtp_derivation_is_found() {
    let (_dir, indexer) = index_single(
        "template <class D> class Base {};\n\
         class Child : public Base<Child> {};\n",
    );

    let derived = indexer.get_derived_classes("Base", false).unwrap();
    assert_eq!(derived.len(), 1);
    assert_eq!(derived[0].qualified_name, "Child");
}

#[test]
fn inheritance_through_template_parameter() {
    let (_dir, indexer) = index_single(
        "class Real {};\n\
         template <class T, class B> class Mixin : public B {};\n\
         class User : public Mixin<int, Real> {};\n",
    );

    let derived = indexer.get_derived_classes("Real", false).unwrap();
    assert_eq!(derived.len(), 1);
    assert_eq!(derived[0].qualified_name, "User");
}

#[test]
fn hierarchy_traversal_reports_ancestors_and_descendants() {
    let (_dir, indexer) = index_single(
        "class Top {};\n\
         class Middle : public Top {};\n\
         class Bottom : public Middle {};\n",
    );

    let hierarchy = indexer.get_class_hierarchy("Middle").unwrap();
    assert_eq!(hierarchy.class.qualified_name, "Middle");
    assert_eq!(hierarchy.bases.len(), 1);
    assert_eq!(hierarchy.bases[0].name, "Top");
    assert_eq!(hierarchy.derived.len(), 1);
    assert_eq!(hierarchy.derived[0].name, "Bottom");

    let full = indexer.get_class_hierarchy("Top").unwrap();
    assert_eq!(full.derived.len(), 1);
    assert_eq!(full.derived[0].name, "Middle");
    assert_eq!(full.derived[0].children.len(), 1);
    assert_eq!(full.derived[0].children[0].name, "Bottom");
}

#[test]
fn class_info_collects_methods_members_and_derived() {
    let (_dir, indexer) = index_single(
        "/// Base widget type.\n\
         class Widget {\npublic:\n    void draw();\n    int width() const;\nprivate:\n    int size_;\n};\n\
         class Button : public Widget {};\n",
    );

    let info = indexer.get_class_info("Widget").unwrap();
    assert_eq!(info.class.qualified_name, "Widget");
    assert_eq!(info.class.brief.as_deref(), Some("Base widget type."));
    assert_eq!(info.class.members, vec!["int size_"]);
    let mut method_names: Vec<&str> = info.methods.iter().map(|m| m.name.as_str()).collect();
    method_names.sort_unstable();
    assert_eq!(method_names, vec!["draw", "width"]);
    assert_eq!(info.derived_classes, vec!["Button"]);
}
