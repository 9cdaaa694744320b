//! Error types for the C++ code-intelligence engine.
//!
//! Structured errors via thiserror. Per-file parse failures are contained by
//! the pipeline and never surface here; these types cover the failures a
//! caller can observe.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for indexing and query operations.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Source file missing or unreadable.
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The parser produced no usable syntax tree.
    #[error("Failed to parse '{path}': {reason}")]
    ParseFailure { path: PathBuf, reason: String },

    /// The compilation database is not a JSON array.
    #[error("Malformed compilation database '{path}': {reason}")]
    MalformedCompilationDatabase { path: PathBuf, reason: String },

    /// A cache row or auxiliary file failed to deserialize.
    #[error("Corrupt cache data ({context}); the affected entry will be rebuilt")]
    CorruptCache { context: String },

    /// The cache schema does not match this build. The main process recreates
    /// the database; a worker observing this is a fatal condition.
    #[error("Cache schema mismatch: found version {found}, expected {expected}")]
    SchemaMismatch { found: i64, expected: i64 },

    /// A query arrived under a `reject` policy while indexing was running.
    #[error("Query rejected: indexing in progress (query_behavior = reject)")]
    PolicyViolation,

    /// Malformed regex, unknown symbol name, invalid filter value.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Symbol '{name}' not found in the index")]
    SymbolNotFound { name: String },

    /// Storage failures inside the parse cache.
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    /// General errors where richer classification adds nothing.
    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Actionable recovery hints surfaced next to the error message.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "If the file was deleted, run a refresh to drop it from the index",
            ],
            Self::MalformedCompilationDatabase { .. } => vec![
                "Regenerate compile_commands.json (e.g. cmake -DCMAKE_EXPORT_COMPILE_COMMANDS=ON)",
                "Indexing continues with fallback compilation arguments",
            ],
            Self::CorruptCache { .. } | Self::SchemaMismatch { .. } => vec![
                "Run 'cppscope index --force' to rebuild the cache from scratch",
                "Check disk space and permissions in the cache directory",
            ],
            Self::PolicyViolation => vec![
                "Retry after indexing completes",
                "Set query_behavior to allow_partial to query the partial index",
            ],
            Self::InvalidInput { .. } => vec![
                "Patterns are case-insensitive regexes matched against the full simple name",
                "Qualified patterns use '::' separators; a leading '::' means global namespace",
            ],
            _ => vec![],
        }
    }
}

/// Errors specific to the embedded store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = IndexError::SchemaMismatch { found: 1, expected: 3 };
        assert!(err.to_string().contains("version 1"));
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn storage_errors_convert() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: IndexError = StorageError::from(json_err).into();
        assert!(matches!(err, IndexError::Storage(_)));
    }
}
