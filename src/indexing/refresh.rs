//! Hash-based change detection and targeted re-indexing.
//!
//! The refresher compares the tracked file set (everything with a recorded
//! content hash) against the current scan, removes state for deleted files,
//! and pushes modified plus added files through the regular pipeline. A
//! tracked header absent from the current enumeration is retained as long
//! as it still exists on disk: compilation databases legitimately do not
//! list headers.

use crate::error::IndexResult;
use crate::indexing::indexer::CppIndexer;
use crate::indexing::{IndexStats, ProgressCallback, hash_file};
use crate::scanner::is_header;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Outcome of one refresh pass.
#[derive(Debug, Default, Serialize)]
pub struct RefreshStats {
    pub deleted: usize,
    pub modified: usize,
    pub added: usize,
    pub pipeline: IndexStats,
}

impl RefreshStats {
    /// Total number of files whose state changed.
    pub fn refreshed_files(&self) -> usize {
        self.deleted + self.modified + self.added
    }
}

/// Detect changes and re-index only what moved. Returns zero counts on an
/// unchanged tree.
pub fn refresh_if_needed(
    indexer: &CppIndexer,
    progress: Option<&ProgressCallback<'_>>,
) -> IndexResult<RefreshStats> {
    let mut stats = RefreshStats::default();

    let current: Vec<PathBuf> = indexer.candidate_files(indexer.settings().include_dependencies);
    let current_set: HashSet<String> = current
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();

    let tracked = indexer.cache().tracked_files()?;

    // Deletions. Headers missing from the enumeration but present on disk
    // are not deletions; the compilation database simply does not list them.
    let mut to_refresh: Vec<PathBuf> = Vec::new();
    for (path, _) in &tracked {
        if current_set.contains(path) {
            continue;
        }
        let on_disk = Path::new(path).exists();
        if is_header(Path::new(path)) && on_disk {
            continue;
        }
        remove_file_state(indexer, path)?;
        stats.deleted += 1;
    }

    // Modifications: hash every tracked file that still exists. Hashing is
    // pure I/O and fans out well.
    let changed: Vec<String> = tracked
        .par_iter()
        .filter(|(path, _)| current_set.contains(path) || Path::new(path).exists())
        .filter_map(|(path, old_hash)| match hash_file(Path::new(path)) {
            Some(hash) if hash != *old_hash => Some(path.clone()),
            _ => None,
        })
        .collect();

    let tracked_set: HashSet<&String> = tracked.iter().map(|(p, _)| p).collect();
    for path in &changed {
        // Purge before re-inserting so stale symbols never linger.
        remove_file_state(indexer, path)?;
        to_refresh.push(PathBuf::from(path));
        stats.modified += 1;
    }

    // Additions.
    for path in &current {
        let path_str = path.to_string_lossy().into_owned();
        if !tracked_set.contains(&path_str) {
            to_refresh.push(path.clone());
            stats.added += 1;
        }
    }

    if !to_refresh.is_empty() {
        stats.pipeline = indexer.run_pipeline(&to_refresh, false, progress)?;
    }
    indexer.finish_pass(&stats.pipeline)?;
    Ok(stats)
}

/// Remove every trace of a file: its symbols in all indexes, its call-graph
/// edges, its cache rows, and any header claims it holds.
fn remove_file_state(indexer: &CppIndexer, path: &str) -> IndexResult<()> {
    let owned_usrs: Vec<String> = match indexer.cache().load_file_record(path)? {
        Some(record) => record.symbols.iter().map(|s| s.usr.clone()).collect(),
        None => Vec::new(),
    };

    let dropped = {
        let mut indexes = indexer.indexes.write();
        indexes.remove_file(path, &owned_usrs)
    };

    {
        let mut graph = indexer.call_graph.write();
        for usr in &dropped {
            graph.remove_symbol(usr);
        }
    }
    for usr in &dropped {
        indexer.cache().remove_call_sites_for_usr(usr)?;
    }

    indexer.cache().remove_file(path)?;
    // Headers this file claimed become claimable again; a header's own
    // claim goes with it.
    indexer.claims().release_claims_of(path);
    indexer.claims().release(path);
    Ok(())
}
