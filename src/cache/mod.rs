//! Durable per-project parse cache backed by SQLite.
//!
//! One database per project identity holds per-file parse records, call
//! sites, type aliases, the parse error log and cache metadata. The main
//! process ensures the schema is current before workers run; workers treat
//! a schema mismatch as fatal. Any row or auxiliary file that fails to
//! deserialize is treated as absent and rebuilt.

use crate::callgraph::CallSite;
use crate::error::{IndexError, IndexResult, StorageError, StorageResult};
use crate::symbol::Symbol;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Bumped whenever the table layout changes; the main process recreates the
/// database on mismatch.
pub const SCHEMA_VERSION: i64 = 3;

/// The per-file persisted parse outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub content_hash: String,
    pub compile_args_hash: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub symbols: Vec<Symbol>,
}

/// A persisted type alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasRecord {
    pub alias_name: String,
    pub qualified_name: String,
    pub target_type: String,
    pub canonical_type: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub alias_kind: crate::types::AliasKind,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub is_template_alias: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_params: Vec<crate::types::TemplateParam>,
}

/// One row of the developer-facing error log.
#[derive(Debug, Clone, Serialize)]
pub struct ParseErrorRecord {
    pub timestamp: i64,
    pub path: String,
    pub content_hash: String,
    pub compile_args_hash: String,
    pub retry_count: u32,
    pub error: String,
}

/// Aggregate view of the error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub distinct_files: usize,
    pub most_recent: Option<i64>,
}

/// Durable key/value store of parse results for one project identity.
#[derive(Debug)]
pub struct ParseCache {
    conn: Mutex<Connection>,
    cache_dir: PathBuf,
}

impl ParseCache {
    /// Open the cache for a directory, creating schema as needed.
    ///
    /// `recreate_on_mismatch` is true in the main process only; workers
    /// must find the schema already current and fail otherwise.
    pub fn open(cache_dir: &Path, recreate_on_mismatch: bool) -> IndexResult<Self> {
        std::fs::create_dir_all(cache_dir).map_err(|e| StorageError::Io {
            path: cache_dir.to_path_buf(),
            source: e,
        })?;
        let db_path = cache_dir.join("index.db");
        let conn = Connection::open(&db_path).map_err(StorageError::from)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(StorageError::from)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(StorageError::from)?;

        let cache = Self {
            conn: Mutex::new(conn),
            cache_dir: cache_dir.to_path_buf(),
        };

        match cache.schema_version()? {
            Some(version) if version == SCHEMA_VERSION => {}
            Some(version) if recreate_on_mismatch => {
                tracing::warn!(
                    "Cache schema version {version} != {SCHEMA_VERSION}; recreating database"
                );
                cache.recreate()?;
            }
            Some(version) => {
                return Err(IndexError::SchemaMismatch {
                    found: version,
                    expected: SCHEMA_VERSION,
                });
            }
            None => cache.create_schema()?,
        }

        Ok(cache)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn schema_version(&self) -> IndexResult<Option<i64>> {
        let conn = self.conn.lock();
        let has_metadata: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='metadata')",
                [],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;
        if !has_metadata {
            return Ok(None);
        }
        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(version.and_then(|v| v.parse().ok()).or(Some(0)))
    }

    fn recreate(&self) -> IndexResult<()> {
        {
            let conn = self.conn.lock();
            conn.execute_batch(
                "DROP TABLE IF EXISTS files;
                 DROP TABLE IF EXISTS call_sites;
                 DROP TABLE IF EXISTS type_aliases;
                 DROP TABLE IF EXISTS parse_errors;
                 DROP TABLE IF EXISTS metadata;",
            )
            .map_err(StorageError::from)?;
        }
        self.create_schema()
    }

    fn create_schema(&self) -> IndexResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS files (
                 path TEXT PRIMARY KEY,
                 content_hash TEXT NOT NULL,
                 compile_args_hash TEXT NOT NULL,
                 success INTEGER NOT NULL,
                 error_message TEXT,
                 retry_count INTEGER NOT NULL DEFAULT 0,
                 symbols_json TEXT NOT NULL,
                 indexed_at INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS call_sites (
                 caller_usr TEXT NOT NULL,
                 callee_usr TEXT NOT NULL,
                 file TEXT NOT NULL,
                 line INTEGER NOT NULL,
                 column INTEGER NOT NULL,
                 UNIQUE(caller_usr, callee_usr, file, line)
             );
             CREATE INDEX IF NOT EXISTS idx_call_sites_caller ON call_sites(caller_usr);
             CREATE INDEX IF NOT EXISTS idx_call_sites_callee ON call_sites(callee_usr);
             CREATE INDEX IF NOT EXISTS idx_call_sites_file ON call_sites(file);
             CREATE TABLE IF NOT EXISTS type_aliases (
                 alias_name TEXT NOT NULL,
                 qualified_name TEXT NOT NULL,
                 target_type TEXT NOT NULL,
                 canonical_type TEXT NOT NULL,
                 file TEXT NOT NULL,
                 line INTEGER NOT NULL,
                 column INTEGER NOT NULL,
                 alias_kind TEXT NOT NULL,
                 namespace TEXT NOT NULL DEFAULT '',
                 is_template_alias INTEGER NOT NULL DEFAULT 0,
                 template_params TEXT,
                 UNIQUE(qualified_name, file, line)
             );
             CREATE INDEX IF NOT EXISTS idx_aliases_name ON type_aliases(alias_name);
             CREATE INDEX IF NOT EXISTS idx_aliases_qualified ON type_aliases(qualified_name);
             CREATE INDEX IF NOT EXISTS idx_aliases_canonical ON type_aliases(canonical_type);
             CREATE TABLE IF NOT EXISTS parse_errors (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp INTEGER NOT NULL,
                 path TEXT NOT NULL,
                 content_hash TEXT NOT NULL,
                 compile_args_hash TEXT NOT NULL,
                 retry_count INTEGER NOT NULL,
                 error TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_parse_errors_path ON parse_errors(path);",
        )
        .map_err(StorageError::from)?;
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    // --- metadata ---------------------------------------------------------

    pub fn metadata(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(StorageError::from)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- file records -----------------------------------------------------

    pub fn save_file_record(&self, record: &FileRecord) -> StorageResult<()> {
        let symbols_json = serde_json::to_string(&record.symbols)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO files
                 (path, content_hash, compile_args_hash, success, error_message,
                  retry_count, symbols_json, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.path,
                record.content_hash,
                record.compile_args_hash,
                record.success,
                record.error_message,
                record.retry_count,
                symbols_json,
                chrono::Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Load a file record; a row whose symbol payload fails to deserialize
    /// is dropped and reported as absent.
    pub fn load_file_record(&self, path: &str) -> StorageResult<Option<FileRecord>> {
        let row: Option<(String, String, bool, Option<String>, u32, String)> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT content_hash, compile_args_hash, success, error_message,
                        retry_count, symbols_json
                 FROM files WHERE path = ?1",
                params![path],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?
        };

        let Some((content_hash, compile_args_hash, success, error_message, retry_count, json)) =
            row
        else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(symbols) => Ok(Some(FileRecord {
                path: path.to_string(),
                content_hash,
                compile_args_hash,
                success,
                error_message,
                retry_count,
                symbols,
            })),
            Err(e) => {
                tracing::debug!("Corrupt symbol payload for '{path}' ({e}); treating as cache miss");
                self.remove_file(path)?;
                Ok(None)
            }
        }
    }

    /// All records, skipping any whose payload is corrupt.
    pub fn all_file_records(&self) -> StorageResult<Vec<FileRecord>> {
        let rows: Vec<(String, String, String, bool, Option<String>, u32, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT path, content_hash, compile_args_hash, success, error_message,
                        retry_count, symbols_json
                 FROM files",
            )?;
            let mapped = stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?;
            mapped.collect::<Result<_, _>>()?
        };

        let mut records = Vec::with_capacity(rows.len());
        let mut corrupt = Vec::new();
        for (path, content_hash, compile_args_hash, success, error_message, retry_count, json) in
            rows
        {
            match serde_json::from_str(&json) {
                Ok(symbols) => records.push(FileRecord {
                    path,
                    content_hash,
                    compile_args_hash,
                    success,
                    error_message,
                    retry_count,
                    symbols,
                }),
                Err(_) => corrupt.push(path),
            }
        }
        for path in corrupt {
            tracing::debug!("Dropping corrupt cache row for '{path}'");
            self.remove_file(&path)?;
        }
        Ok(records)
    }

    /// Paths with a recorded content hash, i.e. the refresher's tracked set.
    pub fn tracked_files(&self) -> StorageResult<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT path, content_hash FROM files")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Remove a file's record and its call sites.
    pub fn remove_file(&self, path: &str) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        conn.execute("DELETE FROM call_sites WHERE file = ?1", params![path])?;
        conn.execute("DELETE FROM type_aliases WHERE file = ?1", params![path])?;
        Ok(())
    }

    // --- call sites -------------------------------------------------------

    pub fn save_call_sites(&self, sites: &[CallSite]) -> StorageResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO call_sites (caller_usr, callee_usr, file, line, column)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for site in sites {
                inserted += stmt.execute(params![
                    site.caller_usr,
                    site.callee_usr,
                    site.file,
                    site.line,
                    site.column,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn call_sites_by_caller(&self, caller_usr: &str) -> StorageResult<Vec<CallSite>> {
        self.query_call_sites(
            "SELECT caller_usr, callee_usr, file, line, column
             FROM call_sites WHERE caller_usr = ?1 ORDER BY file, line",
            caller_usr,
        )
    }

    pub fn call_sites_by_callee(&self, callee_usr: &str) -> StorageResult<Vec<CallSite>> {
        self.query_call_sites(
            "SELECT caller_usr, callee_usr, file, line, column
             FROM call_sites WHERE callee_usr = ?1 ORDER BY file, line",
            callee_usr,
        )
    }

    fn query_call_sites(&self, sql: &str, key: &str) -> StorageResult<Vec<CallSite>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![key], |row| {
            Ok(CallSite {
                caller_usr: row.get(0)?,
                callee_usr: row.get(1)?,
                file: row.get(2)?,
                line: row.get(3)?,
                column: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// All call edges, for rebuilding the in-memory adjacency on warm start.
    pub fn all_call_edges(&self) -> StorageResult<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT caller_usr, callee_usr FROM call_sites")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Wipe a file's call sites ahead of re-inserting them on re-parse.
    pub fn remove_call_sites_for_file(&self, file: &str) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM call_sites WHERE file = ?1", params![file])?;
        Ok(())
    }

    pub fn remove_call_sites_for_usr(&self, usr: &str) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM call_sites WHERE caller_usr = ?1 OR callee_usr = ?1",
            params![usr],
        )?;
        Ok(())
    }

    // --- type aliases -----------------------------------------------------

    pub fn save_type_aliases(&self, aliases: &[TypeAliasRecord]) -> StorageResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut saved = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO type_aliases
                     (alias_name, qualified_name, target_type, canonical_type,
                      file, line, column, alias_kind, namespace,
                      is_template_alias, template_params)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for alias in aliases {
                let kind = match alias.alias_kind {
                    crate::types::AliasKind::Using => "using",
                    crate::types::AliasKind::Typedef => "typedef",
                };
                let template_params = if alias.template_params.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&alias.template_params)?)
                };
                saved += stmt.execute(params![
                    alias.alias_name,
                    alias.qualified_name,
                    alias.target_type,
                    alias.canonical_type,
                    alias.file,
                    alias.line,
                    alias.column,
                    kind,
                    alias.namespace,
                    alias.is_template_alias,
                    template_params,
                ])?;
            }
        }
        tx.commit()?;
        Ok(saved)
    }

    pub fn aliases_by_name(&self, name: &str) -> StorageResult<Vec<TypeAliasRecord>> {
        self.query_aliases(
            "SELECT alias_name, qualified_name, target_type, canonical_type,
                    file, line, column, alias_kind, namespace, is_template_alias, template_params
             FROM type_aliases WHERE alias_name = ?1 OR qualified_name = ?1",
            name,
        )
    }

    pub fn aliases_by_canonical(&self, canonical: &str) -> StorageResult<Vec<TypeAliasRecord>> {
        self.query_aliases(
            "SELECT alias_name, qualified_name, target_type, canonical_type,
                    file, line, column, alias_kind, namespace, is_template_alias, template_params
             FROM type_aliases WHERE canonical_type = ?1 ORDER BY qualified_name",
            canonical,
        )
    }

    fn query_aliases(&self, sql: &str, key: &str) -> StorageResult<Vec<TypeAliasRecord>> {
        let rows: Vec<(
            String,
            String,
            String,
            String,
            String,
            u32,
            u32,
            String,
            String,
            bool,
            Option<String>,
        )> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(sql)?;
            let mapped = stmt.query_map(params![key], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                    row.get(10)?,
                ))
            })?;
            mapped.collect::<Result<_, _>>()?
        };

        let mut aliases = Vec::with_capacity(rows.len());
        for (
            alias_name,
            qualified_name,
            target_type,
            canonical_type,
            file,
            line,
            column,
            kind,
            namespace,
            is_template_alias,
            template_params,
        ) in rows
        {
            let alias_kind = match kind.as_str() {
                "typedef" => crate::types::AliasKind::Typedef,
                _ => crate::types::AliasKind::Using,
            };
            // A corrupt parameter payload degrades to an empty list.
            let template_params = template_params
                .and_then(|json| serde_json::from_str(&json).ok())
                .unwrap_or_default();
            aliases.push(TypeAliasRecord {
                alias_name,
                qualified_name,
                target_type,
                canonical_type,
                file,
                line,
                column,
                alias_kind,
                namespace,
                is_template_alias,
                template_params,
            });
        }
        Ok(aliases)
    }

    // --- error log --------------------------------------------------------

    pub fn log_parse_error(
        &self,
        path: &str,
        content_hash: &str,
        compile_args_hash: &str,
        retry_count: u32,
        error: &str,
    ) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO parse_errors
                 (timestamp, path, content_hash, compile_args_hash, retry_count, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chrono::Utc::now().timestamp(),
                path,
                content_hash,
                compile_args_hash,
                retry_count,
                error,
            ],
        )?;
        Ok(())
    }

    pub fn parse_errors(
        &self,
        limit: Option<usize>,
        path_filter: Option<&str>,
    ) -> StorageResult<Vec<ParseErrorRecord>> {
        let conn = self.conn.lock();
        let limit = limit.unwrap_or(100) as i64;
        let pattern = path_filter.map(|f| format!("%{f}%"));
        let mut stmt = conn.prepare(
            "SELECT timestamp, path, content_hash, compile_args_hash, retry_count, error
             FROM parse_errors
             WHERE (?1 IS NULL OR path LIKE ?1)
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit], |row| {
            Ok(ParseErrorRecord {
                timestamp: row.get(0)?,
                path: row.get(1)?,
                content_hash: row.get(2)?,
                compile_args_hash: row.get(3)?,
                retry_count: row.get(4)?,
                error: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn error_summary(&self) -> StorageResult<ErrorSummary> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT path), MAX(timestamp) FROM parse_errors",
            [],
            |row| {
                Ok(ErrorSummary {
                    total_errors: row.get::<_, i64>(0)? as usize,
                    distinct_files: row.get::<_, i64>(1)? as usize,
                    most_recent: row.get(2)?,
                })
            },
        )
        .map_err(StorageError::from)
    }

    /// Delete error-log rows, optionally only those older than a cutoff.
    /// Returns the number of rows removed.
    pub fn clear_error_log(&self, older_than_days: Option<u32>) -> StorageResult<usize> {
        let conn = self.conn.lock();
        let removed = match older_than_days {
            Some(days) => {
                let cutoff = chrono::Utc::now().timestamp() - i64::from(days) * 86_400;
                conn.execute(
                    "DELETE FROM parse_errors WHERE timestamp < ?1",
                    params![cutoff],
                )?
            }
            None => conn.execute("DELETE FROM parse_errors", [])?,
        };
        Ok(removed)
    }
}

/// Write a JSON value to `path` atomically via `tmp + rename`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp, json).map_err(|e| StorageError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| StorageError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Read a JSON file, treating a missing or corrupt file as `None`.
pub fn read_json_or_none<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("Corrupt auxiliary file '{}' ({e}); rebuilding", path.display());
            let _ = std::fs::remove_file(path);
            None
        }
    }
}
