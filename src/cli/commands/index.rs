//! `init`, `index`, `refresh`, `stats` and `serve` runners.

use crate::cli::commands::emit;
use crate::config::Settings;
use crate::error::IndexResult;
use crate::indexing::{CppIndexer, IndexProgress};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Mutex;

pub fn run_init(project_root: &Path, force: bool) -> Result<(), String> {
    let path = Settings::write_example_config(project_root, force)?;
    println!("Created configuration at {}", path.display());
    Ok(())
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:36.cyan/blue}] {pos}/{len} {msg} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );
    bar
}

pub fn run_index(indexer: &CppIndexer, force: bool, deps: bool, json: bool) -> IndexResult<()> {
    let bar: Mutex<Option<ProgressBar>> = Mutex::new(None);
    let on_progress = |progress: &IndexProgress| {
        let mut slot = bar.lock().expect("progress bar lock");
        let bar = slot.get_or_insert_with(|| progress_bar(progress.total as u64));
        bar.set_position(progress.processed as u64);
        bar.set_message(short_name(&progress.current_file));
    };

    let stats = if !force && indexer.cache_loaded() {
        // Warm start: a refresh pass covers whatever changed.
        let refresh = indexer.refresh_if_needed(Some(&on_progress))?;
        if let Some(bar) = bar.lock().expect("progress bar lock").take() {
            bar.finish_and_clear();
        }
        emit(json, &refresh, |r| {
            println!(
                "Refreshed {} files ({} modified, {} added, {} deleted)",
                r.refreshed_files(),
                r.modified,
                r.added,
                r.deleted
            );
        });
        return Ok(());
    } else {
        indexer.index_project(force, deps.then_some(true), Some(&on_progress))?
    };

    if let Some(bar) = bar.lock().expect("progress bar lock").take() {
        bar.finish_and_clear();
    }
    emit(json, &stats, |s| {
        println!(
            "Indexed {} files in {:.1}s ({} cached, {} failed, {} skipped, {} symbols)",
            s.indexed, s.duration_seconds, s.cache_hits, s.failed, s.skipped, s.symbols
        );
        if s.failed > 0 {
            println!("Run 'cppscope errors list' to inspect parse failures.");
        }
        if s.cancelled {
            println!("Indexing was interrupted; partial state is persisted.");
        }
    });
    Ok(())
}

pub fn run_refresh(indexer: &CppIndexer, json: bool) -> IndexResult<()> {
    let stats = indexer.refresh_if_needed(None)?;
    emit(json, &stats, |r| {
        if r.refreshed_files() == 0 {
            println!("Index is up to date.");
        } else {
            println!(
                "Refreshed {} files ({} modified, {} added, {} deleted)",
                r.refreshed_files(),
                r.modified,
                r.added,
                r.deleted
            );
        }
    });
    Ok(())
}

pub fn run_stats(indexer: &CppIndexer, json: bool) {
    let stats = indexer.get_stats();
    let compile_commands = indexer.compile_commands_stats();
    let combined = serde_json::json!({
        "index": &stats,
        "compile_commands": &compile_commands,
    });
    emit(json, &combined, |_| {
        println!(
            "Symbols: {} ({} classes, {} functions) across {} files",
            stats.total_symbols, stats.classes, stats.functions, stats.files
        );
        println!(
            "Call edges: {}; header claims: {}; warm start: {}",
            stats.call_edges, stats.header_claims, stats.cache_loaded
        );
        println!(
            "Compilation database: {} ({} entries)",
            if compile_commands.database_present {
                "present"
            } else {
                "absent"
            },
            compile_commands.entry_count
        );
    });
}

fn short_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
