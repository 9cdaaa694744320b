//! The parse pipeline: orchestration, merge, incremental refresh.

pub mod indexer;
pub mod indexes;
pub mod refresh;

pub use indexer::CppIndexer;
pub use indexes::SymbolIndexes;
pub use refresh::{RefreshStats, refresh_if_needed};

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 of raw file bytes, used for cache validation and change
/// detection.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash a file's current content; `None` when unreadable.
pub fn hash_file(path: &Path) -> Option<String> {
    std::fs::read(path).ok().map(|bytes| hash_bytes(&bytes))
}

/// Progress snapshot handed to the caller's callback while indexing.
#[derive(Debug, Clone, Serialize)]
pub struct IndexProgress {
    pub total: usize,
    pub processed: usize,
    pub indexed: usize,
    pub failed: usize,
    pub cache_hits: usize,
    pub elapsed_seconds: f64,
    /// Estimated seconds remaining, once enough files completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub current_file: String,
}

/// Final counts for one indexing or refresh pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub indexed: usize,
    pub failed: usize,
    pub cache_hits: usize,
    /// Headers already claimed by another unit, or failures skipped because
    /// their retry budget is exhausted.
    pub skipped: usize,
    pub symbols: usize,
    pub duration_seconds: f64,
    pub cancelled: bool,
}

/// Callback invoked after every completed file.
pub type ProgressCallback<'a> = dyn Fn(&IndexProgress) + Sync + 'a;
