//! The indexer core: owns the indexes, drives the parse pipeline, serves
//! the query surface.
//!
//! Workers are threads fed from a crossbeam channel; each owns its parser
//! state and ships `(symbols, calls, aliases, claimed headers)` bundles back
//! to the main thread, which is the single merge point. Call targets are
//! resolved against the USR index once the pass completes, so forward calls
//! and calls into not-yet-parsed files resolve correctly.

use crate::cache::{FileRecord, ParseCache, ParseErrorRecord, TypeAliasRecord};
use crate::callgraph::{CallGraph, CallSite};
use crate::claims::HeaderClaimTracker;
use crate::compile_commands::{self, CompileCommandsStore};
use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::identity::ProjectIdentity;
use crate::indexing::indexes::SymbolIndexes;
use crate::indexing::{IndexProgress, IndexStats, ProgressCallback, hash_bytes};
use crate::parsing::cpp::{self, CppParser, ParseOutcome, RawCall};
use crate::parsing::includes::{IncludeResolver, scan_includes};
use crate::scanner::{FileScanner, is_header};
use crate::search::{self, SearchFilters, SearchOutcome};
use crate::symbol::{Symbol, usr};
use crate::types::QueryPolicy;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Metadata keys recorded alongside the cache.
const META_CONFIG_FINGERPRINT: &str = "config_fingerprint";
const META_COMPDB_HASH: &str = "compile_commands_hash";

/// One file queued for a worker.
#[derive(Debug, Clone)]
struct WorkItem {
    path: PathBuf,
    args: Vec<String>,
    args_hash: String,
    retry_count: u32,
}

/// Symbols extracted from one file (the requested file or a claimed
/// header), persisted as that file's record.
#[derive(Debug)]
struct FileParseResult {
    path: String,
    content_hash: String,
    args_hash: String,
    symbols: Vec<Symbol>,
    error_count: usize,
}

/// What a worker sends back for one work item.
enum UnitOutcome {
    Parsed {
        results: Vec<FileParseResult>,
        calls: Vec<RawCall>,
        aliases: Vec<TypeAliasRecord>,
        claimed: Vec<(String, String)>,
    },
    /// A header already claimed by another unit.
    AlreadyClaimed { path: PathBuf },
    Failed {
        path: PathBuf,
        content_hash: String,
        args_hash: String,
        reason: String,
        retry_count: u32,
    },
}

/// Persistent C++ code-intelligence index for one project.
pub struct CppIndexer {
    settings: Arc<Settings>,
    project_root: PathBuf,
    identity: ProjectIdentity,
    scanner: Arc<FileScanner>,
    compile_commands: RwLock<CompileCommandsStore>,
    cache: ParseCache,
    claims: Arc<HeaderClaimTracker>,
    pub(crate) indexes: RwLock<SymbolIndexes>,
    pub(crate) call_graph: RwLock<CallGraph>,
    indexing_active: AtomicBool,
    idle_lock: Mutex<()>,
    idle_cv: Condvar,
    cancel: AtomicBool,
    cache_loaded: bool,
}

impl CppIndexer {
    /// Open (or create) the index for a project root. On a warm start the
    /// cache snapshot is loaded into memory; the caller then usually runs
    /// [`CppIndexer::refresh_if_needed`].
    pub fn new(project_root: impl AsRef<Path>) -> IndexResult<Self> {
        let project_root = project_root
            .as_ref()
            .canonicalize()
            .map_err(|e| IndexError::FileRead {
                path: project_root.as_ref().to_path_buf(),
                source: e,
            })?;

        let (settings, config_path) = Settings::load(&project_root);
        crate::logging::init(&settings.diagnostics);
        let settings = Arc::new(settings);

        let identity = ProjectIdentity::new(&project_root, config_path.as_deref());
        let cache_dir = identity.cache_dir();
        let cache = ParseCache::open(&cache_dir, true)?;

        let scanner = Arc::new(FileScanner::new(project_root.clone(), settings.clone()));
        let compile_commands = CompileCommandsStore::new(
            project_root.clone(),
            settings.compile_commands.clone(),
            Some(cache_dir.clone()),
        );
        let claims = Arc::new(HeaderClaimTracker::restore(
            &cache_dir,
            compile_commands.database_hash(),
        ));

        let mut indexer = Self {
            settings,
            project_root,
            identity,
            scanner,
            compile_commands: RwLock::new(compile_commands),
            cache,
            claims,
            indexes: RwLock::new(SymbolIndexes::new()),
            call_graph: RwLock::new(CallGraph::new()),
            indexing_active: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle_cv: Condvar::new(),
            cancel: AtomicBool::new(false),
            cache_loaded: false,
        };
        indexer.try_load_cache();
        Ok(indexer)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn identity(&self) -> &ProjectIdentity {
        &self.identity
    }

    pub fn cache(&self) -> &ParseCache {
        &self.cache
    }

    pub fn cache_loaded(&self) -> bool {
        self.cache_loaded
    }

    pub(crate) fn claims(&self) -> &HeaderClaimTracker {
        &self.claims
    }

    /// Ask a running pass to stop. Unscheduled work is dropped; in-flight
    /// parses finish (a single file parse is bounded).
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    // --- warm start -------------------------------------------------------

    /// Load the cache snapshot when the configuration and compilation
    /// database fingerprints still match.
    fn try_load_cache(&mut self) {
        let config_ok = matches!(
            self.cache.metadata(META_CONFIG_FINGERPRINT),
            Ok(Some(fp)) if fp == self.settings.fingerprint()
        );
        let compdb_ok = matches!(
            self.cache.metadata(META_COMPDB_HASH),
            Ok(Some(hash)) if hash == self.compile_commands.read().database_hash()
        );
        if !config_ok || !compdb_ok {
            tracing::debug!("Cache fingerprints stale or absent; cold start");
            return;
        }

        let records = match self.cache.all_file_records() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Failed to load cache snapshot: {e}");
                return;
            }
        };
        if records.is_empty() {
            return;
        }

        let mut indexes = self.indexes.write();
        for record in &records {
            for symbol in &record.symbols {
                indexes.merge(symbol.clone());
            }
        }
        drop(indexes);

        match self.cache.all_call_edges() {
            Ok(edges) => {
                let mut graph = self.call_graph.write();
                for (caller, callee) in edges {
                    graph.add_call(&caller, &callee);
                }
            }
            Err(e) => tracing::warn!("Failed to rebuild call graph from cache: {e}"),
        }

        self.cache_loaded = true;
        tracing::info!(
            "Warm start: {} files, {} symbols from cache",
            records.len(),
            self.indexes.read().symbol_count()
        );
    }

    // --- pipeline ---------------------------------------------------------

    /// Index the project. `force` discards all in-memory and per-file cache
    /// state first; `include_dependencies` overrides the configured value.
    pub fn index_project(
        &self,
        force: bool,
        include_dependencies: Option<bool>,
        progress: Option<&ProgressCallback<'_>>,
    ) -> IndexResult<IndexStats> {
        let include_deps = include_dependencies.unwrap_or(self.settings.include_dependencies);

        if force {
            self.indexes.write().clear();
            self.call_graph.write().clear();
            self.claims.clear();
        }

        let files = self.candidate_files(include_deps);
        let stats = self.run_pipeline(&files, force, progress)?;
        self.finish_pass(&stats)?;
        Ok(stats)
    }

    /// Detect changed/new/deleted files and update all derived state
    /// without a full rebuild.
    pub fn refresh_if_needed(
        &self,
        progress: Option<&ProgressCallback<'_>>,
    ) -> IndexResult<crate::indexing::refresh::RefreshStats> {
        crate::indexing::refresh::refresh_if_needed(self, progress)
    }

    /// Files to index: exactly the compilation database's files when it is
    /// present and non-empty, the scanner walk otherwise.
    pub(crate) fn candidate_files(&self, include_dependencies: bool) -> Vec<PathBuf> {
        let store = self.compile_commands.read();
        if store.has_entries() {
            store
                .files()
                .into_iter()
                // Listed but absent on disk: skipped, never fatal.
                .filter(|path| path.is_file())
                .collect()
        } else {
            self.scanner.find_files(include_dependencies)
        }
    }

    /// Parse a set of files through the worker pool and merge the results.
    /// Shared by the full pass and the incremental refresher.
    pub(crate) fn run_pipeline(
        &self,
        files: &[PathBuf],
        force: bool,
        progress: Option<&ProgressCallback<'_>>,
    ) -> IndexResult<IndexStats> {
        let started = Instant::now();
        self.cancel.store(false, Ordering::SeqCst);
        self.indexing_active.store(true, Ordering::SeqCst);
        // Always release the gate, even on early error returns.
        let _active = ActiveGuard(self);

        let mut stats = IndexStats {
            total_files: files.len(),
            ..Default::default()
        };

        // Resolve argument vectors up front so workers never touch the
        // compilation database.
        let mut queue: Vec<WorkItem> = Vec::new();
        {
            let store = self.compile_commands.read();
            for path in files {
                let bytes = match std::fs::read(path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!("Cannot read '{}': {e}", path.display());
                        stats.failed += 1;
                        let args = store.args_with_fallback(path);
                        let args_hash = CompileCommandsStore::args_hash(&args);
                        self.record_failure(path, "", &args_hash, 0, &format!("unreadable: {e}"));
                        continue;
                    }
                };
                let content_hash = hash_bytes(&bytes);
                let args = store.args_with_fallback(path);
                let args_hash = CompileCommandsStore::args_hash(&args);

                if bytes.len() as u64 > self.settings.max_file_size_bytes() {
                    stats.failed += 1;
                    self.record_failure(
                        path,
                        &content_hash,
                        &args_hash,
                        self.settings.max_parse_retries,
                        &format!("file exceeds {} MB limit", self.settings.max_file_size_mb),
                    );
                    continue;
                }

                let mut retry_count = 0;
                if !force {
                    match self.cache.load_file_record(&path.to_string_lossy()) {
                        Ok(Some(record))
                            if record.content_hash == content_hash
                                && record.compile_args_hash == args_hash =>
                        {
                            if record.success {
                                let mut indexes = self.indexes.write();
                                for symbol in record.symbols {
                                    indexes.merge(symbol);
                                }
                                stats.cache_hits += 1;
                                continue;
                            }
                            if record.retry_count >= self.settings.max_parse_retries {
                                // Exhausted retries: skip until the hash changes.
                                stats.skipped += 1;
                                continue;
                            }
                            retry_count = record.retry_count;
                        }
                        Ok(_) => {}
                        Err(e) => tracing::debug!("Cache read failed for '{}': {e}", path.display()),
                    }
                }

                // A header reaching the queue has no reusable record, so
                // any claim on it is stale; release it so the worker's
                // self-claim wins.
                if is_header(path) {
                    self.claims.release(&path.to_string_lossy());
                }

                queue.push(WorkItem {
                    path: path.clone(),
                    args,
                    args_hash,
                    retry_count,
                });
            }

            // Cold start: headers extracted through source units in earlier
            // runs have their own records but are absent from the candidate
            // list when a compilation database is present. Adopt the valid
            // ones; queue stale ones for direct re-extraction.
            if !self.cache_loaded {
                let candidate_set: HashSet<String> = files
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect();
                for (path, old_hash) in self.cache.tracked_files()?.into_iter() {
                    if candidate_set.contains(&path) || !is_header(Path::new(&path)) {
                        continue;
                    }
                    match crate::indexing::hash_file(Path::new(&path)) {
                        Some(hash) if hash == old_hash => {
                            if let Ok(Some(record)) = self.cache.load_file_record(&path)
                                && record.success
                            {
                                let mut indexes = self.indexes.write();
                                for symbol in record.symbols {
                                    indexes.merge(symbol);
                                }
                            }
                        }
                        Some(_) => {
                            // Content changed since the claim was taken.
                            self.claims.release(&path);
                            if let Err(e) = self.cache.remove_file(&path) {
                                tracing::debug!("Failed to drop stale header '{path}': {e}");
                            }
                            let header_path = PathBuf::from(&path);
                            let args = store.args_with_fallback(&header_path);
                            let args_hash = CompileCommandsStore::args_hash(&args);
                            queue.push(WorkItem {
                                path: header_path,
                                args,
                                args_hash,
                                retry_count: 0,
                            });
                        }
                        None => {
                            // Header vanished from disk.
                            self.claims.release(&path);
                            if let Err(e) = self.cache.remove_file(&path) {
                                tracing::debug!("Failed to drop deleted header '{path}': {e}");
                            }
                        }
                    }
                }
            }
        }

        let raw_calls = self.parse_and_merge(queue, &mut stats, started, progress)?;
        self.resolve_and_store_calls(raw_calls)?;

        stats.symbols = self.indexes.read().symbol_count();
        stats.duration_seconds = started.elapsed().as_secs_f64();
        stats.cancelled = self.cancel.load(Ordering::SeqCst);
        Ok(stats)
    }

    fn parse_and_merge(
        &self,
        queue: Vec<WorkItem>,
        stats: &mut IndexStats,
        started: Instant,
        progress: Option<&ProgressCallback<'_>>,
    ) -> IndexResult<Vec<RawCall>> {
        if queue.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.settings.effective_workers().min(queue.len());
        let (work_tx, work_rx) = crossbeam_channel::unbounded::<WorkItem>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<UnitOutcome>();
        let expected = queue.len();
        for item in queue {
            let _ = work_tx.send(item);
        }
        drop(work_tx);

        let mut raw_calls: Vec<RawCall> = Vec::new();
        let cache_hits = stats.cache_hits;
        let already_done = cache_hits + stats.failed + stats.skipped;

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let scanner = self.scanner.clone();
                let claims = self.claims.clone();
                let cancel = &self.cancel;
                let project_root = self.project_root.clone();
                scope.spawn(move || {
                    let mut parser = match CppParser::new() {
                        Ok(parser) => parser,
                        Err(e) => {
                            tracing::error!("Worker failed to initialize parser: {e}");
                            return;
                        }
                    };
                    while let Ok(item) = work_rx.recv() {
                        if cancel.load(Ordering::SeqCst) {
                            break;
                        }
                        let outcome =
                            parse_unit(&mut parser, &item, &scanner, &claims, &project_root);
                        if result_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            let mut processed = 0usize;
            while let Ok(outcome) = result_rx.recv() {
                processed += 1;
                let current_file = self.merge_outcome(outcome, stats, &mut raw_calls);

                if let Some(callback) = progress {
                    let elapsed = started.elapsed().as_secs_f64();
                    let eta = if processed >= 3 {
                        let remaining = expected.saturating_sub(processed);
                        Some(elapsed / processed as f64 * remaining as f64)
                    } else {
                        None
                    };
                    callback(&IndexProgress {
                        total: stats.total_files,
                        processed: already_done + processed,
                        indexed: stats.indexed,
                        failed: stats.failed,
                        cache_hits,
                        elapsed_seconds: elapsed,
                        eta_seconds: eta,
                        current_file,
                    });
                }
            }
        });

        Ok(raw_calls)
    }

    /// Merge one worker bundle into the shared state. Returns the file name
    /// for progress display.
    fn merge_outcome(
        &self,
        outcome: UnitOutcome,
        stats: &mut IndexStats,
        raw_calls: &mut Vec<RawCall>,
    ) -> String {
        match outcome {
            UnitOutcome::Parsed {
                results,
                calls,
                aliases,
                claimed,
            } => {
                let display = results
                    .first()
                    .map(|r| r.path.clone())
                    .unwrap_or_default();
                let mut indexes = self.indexes.write();
                for result in &results {
                    for symbol in &result.symbols {
                        indexes.merge(symbol.clone());
                    }
                }
                drop(indexes);

                for result in results {
                    if result.error_count > 0 {
                        tracing::warn!(
                            "'{}' parsed with {} syntax errors; proceeding with partial tree",
                            result.path,
                            result.error_count
                        );
                    }
                    if let Err(e) = self.cache.remove_call_sites_for_file(&result.path) {
                        tracing::debug!("Call-site wipe failed for '{}': {e}", result.path);
                    }
                    let record = FileRecord {
                        path: result.path,
                        content_hash: result.content_hash,
                        compile_args_hash: result.args_hash,
                        success: true,
                        error_message: None,
                        retry_count: 0,
                        symbols: result.symbols,
                    };
                    if let Err(e) = self.cache.save_file_record(&record) {
                        tracing::warn!("Failed to persist record for '{}': {e}", record.path);
                    }
                }

                if !aliases.is_empty()
                    && let Err(e) = self.cache.save_type_aliases(&aliases)
                {
                    tracing::warn!("Failed to persist type aliases: {e}");
                }

                for (header, hash) in claimed {
                    self.claims.mark_completed(&header, &hash);
                }

                raw_calls.extend(calls);
                stats.indexed += 1;
                display
            }
            UnitOutcome::AlreadyClaimed { path } => {
                stats.skipped += 1;
                path.to_string_lossy().into_owned()
            }
            UnitOutcome::Failed {
                path,
                content_hash,
                args_hash,
                reason,
                retry_count,
            } => {
                stats.failed += 1;
                self.record_failure(&path, &content_hash, &args_hash, retry_count + 1, &reason);
                path.to_string_lossy().into_owned()
            }
        }
    }

    fn record_failure(
        &self,
        path: &Path,
        content_hash: &str,
        args_hash: &str,
        retry_count: u32,
        reason: &str,
    ) {
        // Failures in non-project files (dependency directories, stray
        // system paths) are downgraded to warnings: they usually reflect
        // platform or flag mismatches, not project breakage, and must not
        // pollute the persistent error log.
        if !self.scanner.is_project_file(path) {
            tracing::warn!(
                "Skipping non-project file '{}': {reason}",
                path.display()
            );
            return;
        }
        let path_str = path.to_string_lossy();
        let record = FileRecord {
            path: path_str.to_string(),
            content_hash: content_hash.to_string(),
            compile_args_hash: args_hash.to_string(),
            success: false,
            error_message: Some(reason.to_string()),
            retry_count,
            symbols: Vec::new(),
        };
        if let Err(e) = self.cache.save_file_record(&record) {
            tracing::warn!("Failed to persist failure record for '{path_str}': {e}");
        }
        if let Err(e) =
            self.cache
                .log_parse_error(&path_str, content_hash, args_hash, retry_count, reason)
        {
            tracing::debug!("Error-log write failed: {e}");
        }
    }

    /// Resolve raw call records against the USR index and persist them.
    /// Unresolved targets are retained under an external USR.
    fn resolve_and_store_calls(&self, raw_calls: Vec<RawCall>) -> IndexResult<()> {
        if raw_calls.is_empty() {
            return Ok(());
        }
        let indexes = self.indexes.read();
        let mut sites: Vec<CallSite> = Vec::with_capacity(raw_calls.len());
        let mut seen: HashSet<(String, String, String, u32)> = HashSet::new();
        for call in raw_calls {
            let callee_usr = resolve_callee(&indexes, &call.callee_name)
                .unwrap_or_else(|| usr::external(&call.callee_name));
            let key = (
                call.caller_usr.clone(),
                callee_usr.clone(),
                call.file.clone(),
                call.line,
            );
            if !seen.insert(key) {
                continue;
            }
            sites.push(CallSite {
                caller_usr: call.caller_usr,
                callee_usr,
                file: call.file,
                line: call.line,
                column: call.column,
            });
        }
        drop(indexes);

        let mut graph = self.call_graph.write();
        for site in &sites {
            graph.add_call(&site.caller_usr, &site.callee_usr);
        }
        drop(graph);

        self.cache.save_call_sites(&sites)?;
        Ok(())
    }

    /// Persist the per-pass state: claim snapshot, fingerprints, progress
    /// summary. Runs once per pass, never per file.
    pub(crate) fn finish_pass(&self, stats: &IndexStats) -> IndexResult<()> {
        let compdb_hash = self.compile_commands.read().database_hash().to_string();
        if let Err(e) = self.claims.save(self.cache.cache_dir(), &compdb_hash) {
            tracing::warn!("Failed to persist header claims: {e}");
        }
        self.cache
            .set_metadata(META_CONFIG_FINGERPRINT, &self.settings.fingerprint())?;
        self.cache.set_metadata(META_COMPDB_HASH, &compdb_hash)?;

        let summary_path = self.cache.cache_dir().join("progress_summary.json");
        if let Err(e) = crate::cache::write_json_atomic(&summary_path, stats) {
            tracing::debug!("Progress summary write failed: {e}");
        }
        Ok(())
    }

    // --- query gate -------------------------------------------------------

    /// Enforce `query_behavior` for operations arriving mid-index.
    pub fn gate(&self) -> IndexResult<()> {
        if !self.indexing_active.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.settings.query_behavior {
            QueryPolicy::AllowPartial => Ok(()),
            QueryPolicy::Reject => Err(IndexError::PolicyViolation),
            QueryPolicy::Block => {
                let mut guard = self.idle_lock.lock();
                while self.indexing_active.load(Ordering::SeqCst) {
                    self.idle_cv.wait(&mut guard);
                }
                Ok(())
            }
        }
    }

    // --- query surface ----------------------------------------------------

    pub fn search_classes(
        &self,
        pattern: &str,
        filters: &SearchFilters,
    ) -> IndexResult<SearchOutcome> {
        self.gate()?;
        let indexes = self.indexes.read();
        search::search_classes(&indexes, pattern, filters, Some(&self.project_root))
    }

    pub fn search_functions(
        &self,
        pattern: &str,
        filters: &SearchFilters,
    ) -> IndexResult<SearchOutcome> {
        self.gate()?;
        let indexes = self.indexes.read();
        search::search_functions(&indexes, pattern, filters, Some(&self.project_root))
    }

    /// Partitioned `{classes, functions}` search.
    pub fn search_symbols(
        &self,
        pattern: &str,
        filters: &SearchFilters,
    ) -> IndexResult<SymbolSearchResult> {
        self.gate()?;
        let indexes = self.indexes.read();
        let classes = search::search_classes(&indexes, pattern, filters, Some(&self.project_root))?;
        let functions =
            search::search_functions(&indexes, pattern, filters, Some(&self.project_root))?;
        Ok(SymbolSearchResult { classes, functions })
    }

    pub fn get_derived_classes(
        &self,
        base: &str,
        project_only: bool,
    ) -> IndexResult<Vec<Arc<Symbol>>> {
        self.gate()?;
        let indexes = self.indexes.read();
        Ok(search::derived_classes(&indexes, base, project_only))
    }

    pub fn get_class_hierarchy(&self, name: &str) -> IndexResult<search::ClassHierarchy> {
        self.gate()?;
        let indexes = self.indexes.read();
        search::class_hierarchy(&indexes, name)
    }

    /// Class record plus methods, members, bases, direct derived classes
    /// and documentation.
    pub fn get_class_info(&self, name: &str) -> IndexResult<ClassInfo> {
        self.gate()?;
        let indexes = self.indexes.read();
        let Some(class) = search::resolve_class(&indexes, name)? else {
            return Err(IndexError::SymbolNotFound {
                name: name.to_string(),
            });
        };
        let methods: Vec<Arc<Symbol>> = indexes
            .functions()
            .filter(|s| s.parent_class == class.name)
            .filter(|s| {
                s.qualified_name
                    .strip_suffix(&format!("::{}", s.name))
                    .is_some_and(|prefix| prefix == class.qualified_name)
            })
            .cloned()
            .collect();
        let derived = search::derived_classes(&indexes, &class.name, false)
            .into_iter()
            .map(|s| s.qualified_name.clone())
            .collect();
        Ok(ClassInfo {
            methods,
            derived_classes: derived,
            class,
        })
    }

    /// Human-readable signatures for every overload of a function.
    pub fn get_function_signature(
        &self,
        name: &str,
        class_name: Option<&str>,
    ) -> IndexResult<Vec<String>> {
        self.gate()?;
        let filters = SearchFilters {
            class_name: class_name.map(str::to_string),
            ..Default::default()
        };
        let outcome = {
            let indexes = self.indexes.read();
            search::search_functions(&indexes, name, &filters, Some(&self.project_root))?
        };
        if outcome.symbols.is_empty() {
            return Err(IndexError::SymbolNotFound {
                name: name.to_string(),
            });
        }
        Ok(outcome
            .symbols
            .iter()
            .map(|s| format!("{}  [{}]", s.human_signature(), s.location()))
            .collect())
    }

    fn function_usrs(&self, name: &str, class_name: Option<&str>) -> IndexResult<Vec<String>> {
        let filters = SearchFilters {
            class_name: class_name.map(str::to_string),
            ..Default::default()
        };
        let indexes = self.indexes.read();
        let outcome =
            search::search_functions(&indexes, name, &filters, Some(&self.project_root))?;
        Ok(outcome
            .symbols
            .iter()
            .filter(|s| !s.usr.is_empty())
            .map(|s| s.usr.clone())
            .collect())
    }

    /// `{callers, call_sites, total_call_sites}` for a function.
    pub fn find_callers(
        &self,
        name: &str,
        class_name: Option<&str>,
        include_call_sites: bool,
    ) -> IndexResult<CallersResult> {
        self.gate()?;
        let usrs = self.function_usrs(name, class_name)?;
        if usrs.is_empty() {
            return Err(IndexError::SymbolNotFound {
                name: name.to_string(),
            });
        }

        let mut callers: Vec<Arc<Symbol>> = Vec::new();
        let mut call_sites: Vec<CallSite> = Vec::new();
        {
            let graph = self.call_graph.read();
            let indexes = self.indexes.read();
            let mut seen = HashSet::new();
            for usr in &usrs {
                for caller_usr in graph.callers(usr) {
                    if seen.insert(caller_usr.clone())
                        && let Some(symbol) = indexes.usr_index.get(&caller_usr)
                    {
                        callers.push(symbol.clone());
                    }
                }
            }
        }
        callers.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));

        if include_call_sites {
            for usr in &usrs {
                call_sites.extend(self.cache.call_sites_by_callee(usr)?);
            }
            call_sites.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        }
        let total_call_sites = call_sites.len();
        Ok(CallersResult {
            callers,
            call_sites,
            total_call_sites,
        })
    }

    /// Functions called by the named function.
    pub fn find_callees(&self, name: &str, class_name: Option<&str>) -> IndexResult<CalleesResult> {
        self.gate()?;
        let usrs = self.function_usrs(name, class_name)?;
        if usrs.is_empty() {
            return Err(IndexError::SymbolNotFound {
                name: name.to_string(),
            });
        }
        let graph = self.call_graph.read();
        let indexes = self.indexes.read();
        let mut callees = Vec::new();
        let mut external = Vec::new();
        let mut seen = HashSet::new();
        for usr in &usrs {
            for callee_usr in graph.callees(usr) {
                if !seen.insert(callee_usr.clone()) {
                    continue;
                }
                match indexes.usr_index.get(&callee_usr) {
                    Some(symbol) => callees.push(symbol.clone()),
                    None => external.push(callee_usr),
                }
            }
        }
        callees.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        external.sort();
        Ok(CalleesResult { callees, external })
    }

    /// Outgoing call sites of a function, with exact locations.
    pub fn get_call_sites(
        &self,
        name: &str,
        class_name: Option<&str>,
    ) -> IndexResult<Vec<CallSite>> {
        self.gate()?;
        let usrs = self.function_usrs(name, class_name)?;
        if usrs.is_empty() {
            return Err(IndexError::SymbolNotFound {
                name: name.to_string(),
            });
        }
        let mut sites = Vec::new();
        for usr in &usrs {
            sites.extend(self.cache.call_sites_by_caller(usr)?);
        }
        sites.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        Ok(sites)
    }

    /// Call paths between two functions, as display names.
    pub fn get_call_path(
        &self,
        from: &str,
        to: &str,
        max_depth: usize,
    ) -> IndexResult<Vec<Vec<String>>> {
        self.gate()?;
        let from_usrs = self.function_usrs(from, None)?;
        let to_usrs = self.function_usrs(to, None)?;
        if from_usrs.is_empty() {
            return Err(IndexError::SymbolNotFound {
                name: from.to_string(),
            });
        }
        if to_usrs.is_empty() {
            return Err(IndexError::SymbolNotFound {
                name: to.to_string(),
            });
        }

        let graph = self.call_graph.read();
        let indexes = self.indexes.read();
        let mut paths = Vec::new();
        for from_usr in &from_usrs {
            for to_usr in &to_usrs {
                for path in graph.call_paths(from_usr, to_usr, max_depth) {
                    paths.push(
                        path.iter()
                            .map(|usr| display_name(&indexes, usr))
                            .collect::<Vec<_>>(),
                    );
                }
            }
        }
        Ok(paths)
    }

    /// Symbols in files matching a path or glob; fuzzy suggestions when
    /// nothing matches.
    pub fn find_in_file(&self, path_or_glob: &str, pattern: &str) -> IndexResult<FindInFileResult> {
        self.gate()?;
        let name_pattern = search::NamePattern::compile(pattern)?;
        let indexes = self.indexes.read();

        let is_glob = path_or_glob.contains(['*', '?', '[']);
        let glob_matcher = if is_glob {
            Some(
                glob::Pattern::new(path_or_glob).map_err(|e| IndexError::InvalidInput {
                    reason: format!("invalid glob '{path_or_glob}': {e}"),
                })?,
            )
        } else {
            None
        };

        let mut files: Vec<FileSymbols> = Vec::new();
        for (file, symbols) in &indexes.file_index {
            let matched = match &glob_matcher {
                Some(matcher) => {
                    matcher.matches(file)
                        || self
                            .relative_to_root(file)
                            .is_some_and(|rel| matcher.matches(&rel))
                }
                None => {
                    file == path_or_glob
                        || file.ends_with(&format!("/{}", path_or_glob.trim_start_matches("./")))
                        || self
                            .relative_to_root(file)
                            .is_some_and(|rel| rel == path_or_glob.trim_start_matches("./"))
                }
            };
            if !matched {
                continue;
            }
            let mut hits: Vec<Arc<Symbol>> = symbols
                .iter()
                .filter(|s| name_pattern.matches(s))
                .cloned()
                .collect();
            hits.sort_by_key(|s| s.line);
            if !hits.is_empty() || glob_matcher.is_none() {
                files.push(FileSymbols {
                    file: file.clone(),
                    symbols: hits,
                });
            }
        }
        files.sort_by(|a, b| a.file.cmp(&b.file));

        if files.is_empty() {
            let suggestions = self.path_suggestions(&indexes, path_or_glob, 5);
            let message = format!(
                "No indexed file matches '{path_or_glob}'.{}",
                if suggestions.is_empty() {
                    String::new()
                } else {
                    " Did you mean one of the suggested paths?".to_string()
                }
            );
            return Ok(FindInFileResult {
                files,
                suggestions,
                message: Some(message),
            });
        }
        Ok(FindInFileResult {
            files,
            suggestions: Vec::new(),
            message: None,
        })
    }

    fn relative_to_root(&self, file: &str) -> Option<String> {
        Path::new(file)
            .strip_prefix(&self.project_root)
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }

    fn path_suggestions(
        &self,
        indexes: &SymbolIndexes,
        wanted: &str,
        max: usize,
    ) -> Vec<String> {
        let wanted_name = Path::new(wanted)
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| wanted.to_lowercase());
        let mut scored: Vec<(usize, String)> = indexes
            .file_index
            .keys()
            .filter_map(|file| {
                let base = Path::new(file).file_name()?.to_string_lossy().to_lowercase();
                let score = if base == wanted_name {
                    0
                } else if base.contains(&wanted_name) || wanted_name.contains(&base) {
                    1
                } else if file.to_lowercase().contains(&wanted_name) {
                    2
                } else {
                    return None;
                };
                Some((score, file.clone()))
            })
            .collect();
        scored.sort();
        scored.into_iter().take(max).map(|(_, f)| f).collect()
    }

    /// Files referencing a symbol, with the total reference count.
    pub fn get_files_containing_symbol(
        &self,
        name: &str,
        symbol_kind: Option<crate::types::SymbolKind>,
        project_only: bool,
    ) -> IndexResult<FilesContainingSymbol> {
        self.gate()?;
        let pattern = search::NamePattern::compile(name)?;
        let indexes = self.indexes.read();
        let mut files: HashSet<String> = HashSet::new();
        let mut total = 0usize;
        let mut kind = None;
        for symbol in indexes.classes().chain(indexes.functions()) {
            if !pattern.matches(symbol) {
                continue;
            }
            if let Some(wanted) = symbol_kind
                && symbol.kind != wanted
            {
                continue;
            }
            if project_only && !symbol.is_project {
                continue;
            }
            kind.get_or_insert(symbol.kind);
            total += 1;
            files.insert(symbol.file.clone());
            if let Some(header) = &symbol.header_file {
                files.insert(header.clone());
            }
        }
        if total == 0 {
            return Err(IndexError::SymbolNotFound {
                name: name.to_string(),
            });
        }
        let mut files: Vec<String> = files.into_iter().collect();
        files.sort();
        Ok(FilesContainingSymbol {
            symbol: name.to_string(),
            kind,
            files,
            total_references: total,
        })
    }

    /// Canonical type plus all aliases for a name, or ambiguous/not-found.
    pub fn get_type_alias_info(&self, name: &str) -> IndexResult<TypeAliasInfo> {
        self.gate()?;

        // Step 1: the name may itself be an alias; chase its canonical type.
        let mut target = name.to_string();
        let alias_records = self.cache.aliases_by_name(name)?;
        if let Some(first) = alias_records.first() {
            target = first.canonical_type.clone();
        }
        let lookup = target.split('<').next().unwrap_or(&target).trim().to_string();

        let indexes = self.indexes.read();
        let pattern = search::NamePattern::compile(&lookup)?;
        let mut matches: Vec<Arc<Symbol>> = indexes
            .classes()
            .filter(|s| pattern.matches(s))
            .cloned()
            .collect();

        let mut distinct: Vec<String> = matches
            .iter()
            .map(|s| s.qualified_name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        distinct.sort();

        match distinct.len() {
            0 => Ok(TypeAliasInfo::NotFound {
                name: name.to_string(),
            }),
            1 => {
                matches.sort_by_key(|s| !s.is_definition);
                let class = matches.remove(0);
                let mut aliases = self.cache.aliases_by_canonical(&class.name)?;
                for extra in self.cache.aliases_by_canonical(&class.qualified_name)? {
                    if !aliases
                        .iter()
                        .any(|a| a.qualified_name == extra.qualified_name && a.file == extra.file)
                    {
                        aliases.push(extra);
                    }
                }
                aliases.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
                Ok(TypeAliasInfo::Resolved {
                    name: name.to_string(),
                    canonical_type: class.qualified_name.clone(),
                    file: class.file.clone(),
                    line: class.line,
                    is_definition: class.is_definition,
                    aliases,
                })
            }
            _ => Ok(TypeAliasInfo::Ambiguous {
                name: name.to_string(),
                candidates: distinct,
            }),
        }
    }

    // --- developer-facing error log ---------------------------------------

    pub fn get_parse_errors(
        &self,
        limit: Option<usize>,
        path_filter: Option<&str>,
    ) -> IndexResult<Vec<ParseErrorRecord>> {
        Ok(self.cache.parse_errors(limit, path_filter)?)
    }

    pub fn get_error_summary(&self) -> IndexResult<crate::cache::ErrorSummary> {
        Ok(self.cache.error_summary()?)
    }

    pub fn clear_error_log(&self, older_than_days: Option<u32>) -> IndexResult<usize> {
        Ok(self.cache.clear_error_log(older_than_days)?)
    }

    /// Index statistics for the stats query.
    pub fn get_stats(&self) -> IndexerStats {
        let indexes = self.indexes.read();
        let classes = indexes.classes().count();
        let functions = indexes.functions().count();
        IndexerStats {
            total_symbols: indexes.symbol_count(),
            classes,
            functions,
            files: indexes.file_index.len(),
            call_edges: self.call_graph.read().edge_count(),
            header_claims: self.claims.len(),
            cache_loaded: self.cache_loaded,
        }
    }

    pub fn compile_commands_stats(&self) -> compile_commands::CompileCommandsStats {
        self.compile_commands.read().stats()
    }
}

/// Releases the indexing gate when a pass ends, however it ends.
struct ActiveGuard<'a>(&'a CppIndexer);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.indexing_active.store(false, Ordering::SeqCst);
        let _guard = self.0.idle_lock.lock();
        self.0.idle_cv.notify_all();
    }
}

/// Resolve a callee name path to the USR of the best-matching function.
/// Template calls already arrive with their arguments stripped, so the
/// generic template wins.
fn resolve_callee(indexes: &SymbolIndexes, name: &str) -> Option<String> {
    let simple = name.rsplit("::").next().unwrap_or(name);
    let entries = indexes.function_index.get(simple)?;
    let qualified = name.contains("::");
    let mut best: Option<&Arc<Symbol>> = None;
    for symbol in entries {
        if qualified
            && symbol.qualified_name != name
            && !symbol.qualified_name.ends_with(&format!("::{name}"))
        {
            continue;
        }
        match best {
            None => best = Some(symbol),
            Some(current) => {
                // Prefer definitions, then earlier qualified names for
                // deterministic resolution across overloads.
                let better = (symbol.is_definition && !current.is_definition)
                    || (symbol.is_definition == current.is_definition
                        && symbol.qualified_name < current.qualified_name);
                if better {
                    best = Some(symbol);
                }
            }
        }
    }
    best.map(|s| s.usr.clone())
}

fn display_name(indexes: &SymbolIndexes, usr: &str) -> String {
    match indexes.usr_index.get(usr) {
        Some(symbol) => symbol.qualified_name.clone(),
        None => usr
            .strip_prefix("c:@F@")
            .map(|rest| rest.split('#').next().unwrap_or(rest).to_string())
            .unwrap_or_else(|| usr.to_string()),
    }
}

// --- worker side -----------------------------------------------------------

/// Parse one work item: the file itself plus any project headers this unit
/// wins the claim for, transitively.
fn parse_unit(
    parser: &mut CppParser,
    item: &WorkItem,
    scanner: &FileScanner,
    claims: &HeaderClaimTracker,
    project_root: &Path,
) -> UnitOutcome {
    let path_str = item.path.to_string_lossy().into_owned();
    let bytes = match std::fs::read(&item.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return UnitOutcome::Failed {
                path: item.path.clone(),
                content_hash: String::new(),
                args_hash: item.args_hash.clone(),
                reason: format!("unreadable: {e}"),
                retry_count: item.retry_count,
            };
        }
    };
    let content_hash = hash_bytes(&bytes);

    // A header dispatched directly must win its own claim; headers already
    // extracted through a source unit are skipped.
    let mut claimed: Vec<(String, String)> = Vec::new();
    if is_header(&item.path) {
        if !claims.try_claim(&path_str, &path_str, &content_hash) {
            return UnitOutcome::AlreadyClaimed {
                path: item.path.clone(),
            };
        }
        claimed.push((path_str.clone(), content_hash.clone()));
    }

    let code = String::from_utf8_lossy(&bytes).into_owned();
    let resolver = IncludeResolver::new(
        project_root.to_path_buf(),
        compile_commands::include_dirs(&item.args, project_root),
    );

    let mut results: Vec<FileParseResult> = Vec::new();
    let mut calls: Vec<RawCall> = Vec::new();
    let mut aliases: Vec<TypeAliasRecord> = Vec::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    visited.insert(item.path.clone());

    // Queue of (path, code, hash) still to extract within this unit.
    let mut pending: Vec<(PathBuf, String, String)> = vec![(item.path.clone(), code, content_hash.clone())];
    let mut first = true;

    while let Some((path, code, hash)) = pending.pop() {
        let path_str = path.to_string_lossy().into_owned();
        let tree = match parser.parse(&code) {
            ParseOutcome::Full(tree) => (tree, 0),
            ParseOutcome::Partial(tree, errors) => (tree, errors),
            ParseOutcome::Failed(reason) => {
                if first {
                    // Release anything claimed so a later pass can retry.
                    for (header, _) in &claimed {
                        claims.release(header);
                    }
                    return UnitOutcome::Failed {
                        path,
                        content_hash: hash,
                        args_hash: item.args_hash.clone(),
                        reason,
                        retry_count: item.retry_count,
                    };
                }
                // A broken claimed header: record the failure, release the
                // claim so a later pass can retry it, keep the unit alive.
                tracing::warn!("Claimed header '{path_str}' failed to parse: {reason}");
                claims.release(&path_str);
                claimed.retain(|(h, _)| *h != path_str);
                continue;
            }
        };
        first = false;
        let (tree, error_count) = tree;

        let is_project = scanner.is_project_file(&path);
        let mut output = cpp::extract(&tree, &code, &path_str, is_project);
        calls.append(&mut output.calls);
        aliases.append(&mut output.aliases);

        // Claim reachable project headers, first win only.
        for directive in scan_includes(tree.root_node(), &code) {
            let Some(resolved) = resolver.resolve(&directive, &path) else {
                continue;
            };
            if !visited.insert(resolved.clone()) {
                continue;
            }
            if !is_header(&resolved) || !scanner.is_project_file(&resolved) {
                continue;
            }
            let Ok(header_bytes) = std::fs::read(&resolved) else {
                continue;
            };
            let header_hash = hash_bytes(&header_bytes);
            let resolved_str = resolved.to_string_lossy().into_owned();
            if claims.try_claim(&resolved_str, &item.path.to_string_lossy(), &header_hash) {
                claimed.push((resolved_str, header_hash.clone()));
                pending.push((
                    resolved,
                    String::from_utf8_lossy(&header_bytes).into_owned(),
                    header_hash,
                ));
            }
        }

        results.push(FileParseResult {
            path: path_str,
            content_hash: hash,
            // Headers inherit the claiming unit's argument hash.
            args_hash: item.args_hash.clone(),
            symbols: output.symbols,
            error_count,
        });
    }

    UnitOutcome::Parsed {
        results,
        calls,
        aliases,
        claimed,
    }
}

// --- query result shapes ----------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SymbolSearchResult {
    pub classes: SearchOutcome,
    pub functions: SearchOutcome,
}

#[derive(Debug, Serialize)]
pub struct ClassInfo {
    pub class: Arc<Symbol>,
    pub methods: Vec<Arc<Symbol>>,
    pub derived_classes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CallersResult {
    pub callers: Vec<Arc<Symbol>>,
    pub call_sites: Vec<CallSite>,
    pub total_call_sites: usize,
}

#[derive(Debug, Serialize)]
pub struct CalleesResult {
    pub callees: Vec<Arc<Symbol>>,
    /// Call targets that never resolved in the index (external functions).
    pub external: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FileSymbols {
    pub file: String,
    pub symbols: Vec<Arc<Symbol>>,
}

#[derive(Debug, Serialize)]
pub struct FindInFileResult {
    pub files: Vec<FileSymbols>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FilesContainingSymbol {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<crate::types::SymbolKind>,
    pub files: Vec<String>,
    pub total_references: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TypeAliasInfo {
    NotFound {
        name: String,
    },
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },
    Resolved {
        name: String,
        canonical_type: String,
        file: String,
        line: u32,
        is_definition: bool,
        aliases: Vec<TypeAliasRecord>,
    },
}

#[derive(Debug, Serialize)]
pub struct IndexerStats {
    pub total_symbols: usize,
    pub classes: usize,
    pub functions: usize,
    pub files: usize,
    pub call_edges: usize,
    pub header_claims: usize,
    pub cache_loaded: bool,
}
