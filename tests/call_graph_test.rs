//! Call-graph queries: callers, callees, call sites, paths, and template
//! call canonicalization.

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
fn template_instantiations_share_one_callee() {
    let (_dir, indexer) = index_single(
        "template <typename T> void f(T value) { (void)value; }\n\
         void caller() {\n    f<int>(1);\n    f<double>(1.0);\n}\n",
    );

    let sites = indexer.get_call_sites("caller", None).unwrap();
    assert_eq!(sites.len(), 2);
    assert_eq!(
        sites[0].callee_usr, sites[1].callee_usr,
        "both instantiations attach to the generic template"
    );
    assert_ne!(
        (sites[0].line, sites[0].column),
        (sites[1].line, sites[1].column)
    );

    let callees = indexer.find_callees("caller", None).unwrap();
    assert_eq!(callees.callees.len(), 1);
    assert_eq!(callees.callees[0].name, "f");

    let callers = indexer.find_callers("f", None, true).unwrap();
    assert_eq!(callers.callers.len(), 1);
    assert_eq!(callers.callers[0].name, "caller");
    assert_eq!(callers.total_call_sites, 2);
}

#[test]
fn call_sites_sorted_by_file_then_line() {
    let (_dir, indexer) = index_single(
        "void target() {}\n\
         void one() { target(); }\n\
         void two() {\n    target();\n    target();\n}\n",
    );

    let result = indexer.find_callers("target", None, true).unwrap();
    assert_eq!(result.callers.len(), 2);
    assert_eq!(result.total_call_sites, 3);
    let lines: Vec<u32> = result.call_sites.iter().map(|s| s.line).collect();
    let mut sorted = lines.clone();
    sorted.sort_unstable();
    assert_eq!(lines, sorted);
}

#[test]
fn call_paths_within_depth() {
    let (_dir, indexer) = index_single(
        "void leaf() {}\n\
         void mid() { leaf(); }\n\
         void top() { mid(); }\n",
    );

    let paths = indexer.get_call_path("top", "leaf", 10).unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0], vec!["top", "mid", "leaf"]);

    let short = indexer.get_call_path("top", "leaf", 1).unwrap();
    assert!(short.is_empty(), "path is two edges, depth 1 finds nothing");
}

#[test]
fn external_callees_are_retained() {
    let (_dir, indexer) = index_single(
        "#include <cstdio>\nvoid logger() {\n    printf(\"x\");\n}\n",
    );

    let callees = indexer.find_callees("logger", None).unwrap();
    assert!(callees.callees.is_empty());
    assert_eq!(callees.external.len(), 1, "printf resolves to an external target");
}

#[test]
fn method_calls_resolve_to_methods() {
    let (_dir, indexer) = index_single(
        "class Engine {\npublic:\n    void start() {}\n};\n\
         void boot(Engine& e) {\n    e.start();\n}\n",
    );

    let callers = indexer.find_callers("start", Some("Engine"), false).unwrap();
    assert_eq!(callers.callers.len(), 1);
    assert_eq!(callers.callers[0].name, "boot");
}
