//! Failure containment and the developer-facing error log.

use cppscope::config::CONFIG_FILENAME;
use cppscope::indexing::CppIndexer;
use cppscope::search::SearchFilters;
use std::fs;
use tempfile::TempDir;

#[test]
fn oversized_file_is_contained_and_logged() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    // A tiny size cap makes big.cpp an automatic failure.
    fs::write(
        root.join(CONFIG_FILENAME),
        r#"{"max_file_size_mb": 0.0001}"#,
    )
    .unwrap();
    fs::write(root.join("ok.cpp"), "class Ok {};\n").unwrap();
    fs::write(root.join("big.cpp"), format!("// {}\nclass Big {{}};\n", "x".repeat(4096))).unwrap();

    let indexer = CppIndexer::new(root).unwrap();
    let stats = indexer.index_project(true, None, None).unwrap();

    // The failure never aborts the pipeline.
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.indexed, 1);
    assert_eq!(
        indexer
            .search_classes("Ok", &SearchFilters::default())
            .unwrap()
            .total,
        1
    );
    assert_eq!(
        indexer
            .search_classes("Big", &SearchFilters::default())
            .unwrap()
            .total,
        0
    );

    // The error log records the failure with its path.
    let errors = indexer.get_parse_errors(None, None).unwrap();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.path.ends_with("big.cpp")));

    let filtered = indexer.get_parse_errors(None, Some("big.cpp")).unwrap();
    assert_eq!(filtered.len(), errors.len());
    assert!(indexer.get_parse_errors(None, Some("ok.cpp")).unwrap().is_empty());

    let summary = indexer.get_error_summary().unwrap();
    assert!(summary.total_errors >= 1);
    assert_eq!(summary.distinct_files, 1);

    // Clearing empties the log without touching symbols.
    let removed = indexer.clear_error_log(None).unwrap();
    assert!(removed >= 1);
    assert_eq!(indexer.get_error_summary().unwrap().total_errors, 0);
    assert_eq!(
        indexer
            .search_classes("Ok", &SearchFilters::default())
            .unwrap()
            .total,
        1
    );
}

#[test]
fn dependency_failures_are_warnings_not_errors() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("third_party")).unwrap();
    fs::write(
        root.join(CONFIG_FILENAME),
        r#"{"max_file_size_mb": 0.0001}"#,
    )
    .unwrap();
    fs::write(root.join("ok.cpp"), "class Ok {};\n").unwrap();
    // Two oversized files: one in the project, one in a dependency dir.
    fs::write(root.join("big.cpp"), format!("// {}\nclass Big {{}};\n", "x".repeat(4096))).unwrap();
    fs::write(
        root.join("third_party/huge.cpp"),
        format!("// {}\nclass Vendor {{}};\n", "z".repeat(4096)),
    )
    .unwrap();

    let indexer = CppIndexer::new(root).unwrap();
    let stats = indexer.index_project(true, Some(true), None).unwrap();

    // Both failures show in the pass counters...
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.indexed, 1);

    // ...but only the project file reaches the persistent error log; the
    // dependency failure is downgraded to a warning.
    let errors = indexer.get_parse_errors(None, None).unwrap();
    assert!(errors.iter().any(|e| e.path.ends_with("big.cpp")));
    assert!(!errors.iter().any(|e| e.path.contains("third_party")));
    assert_eq!(indexer.get_error_summary().unwrap().distinct_files, 1);

    // No failure record either: the dependency file is simply skipped.
    let huge = root
        .canonicalize()
        .unwrap()
        .join("third_party/huge.cpp");
    assert!(
        indexer
            .cache()
            .load_file_record(&huge.to_string_lossy())
            .unwrap()
            .is_none()
    );
}

#[test]
fn clear_error_log_with_age_cutoff_keeps_recent_entries() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("f.cpp"), "class F {};\n").unwrap();
    let indexer = CppIndexer::new(dir.path()).unwrap();
    indexer.index_project(true, None, None).unwrap();

    indexer
        .cache()
        .log_parse_error("/p/fresh.cpp", "h", "h", 0, "recent failure")
        .unwrap();

    // Entries logged just now are younger than any cutoff.
    let removed = indexer.clear_error_log(Some(7)).unwrap();
    assert_eq!(removed, 0);
    assert_eq!(indexer.get_error_summary().unwrap().total_errors, 1);

    assert_eq!(indexer.clear_error_log(None).unwrap(), 1);
}

#[test]
fn failure_records_do_not_block_recovery_after_edit() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(
        root.join(CONFIG_FILENAME),
        r#"{"max_file_size_mb": 0.0001}"#,
    )
    .unwrap();
    fs::write(root.join("grow.cpp"), format!("// {}\nclass Grown {{}};\n", "y".repeat(4096))).unwrap();

    let indexer = CppIndexer::new(root).unwrap();
    let stats = indexer.index_project(true, None, None).unwrap();
    assert_eq!(stats.failed, 1);

    // Shrink the file below the cap; the refresher re-parses it.
    fs::write(root.join("grow.cpp"), "class Grown {};\n").unwrap();
    let refresh = indexer.refresh_if_needed(None).unwrap();
    assert_eq!(refresh.modified, 1);
    assert_eq!(
        indexer
            .search_classes("Grown", &SearchFilters::default())
            .unwrap()
            .total,
        1
    );
}
