//! First-win header claiming.
//!
//! Many translation units include the same project header; the first source
//! to reach it claims it and is the only one that extracts it. The tracker
//! is persisted as a JSON snapshot keyed by the compilation-database hash:
//! when the database changes, all claims are cleared so headers are
//! re-analyzed under the new flags. Persistence happens once per indexing
//! pass, not per file.

use crate::cache;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

const SNAPSHOT_FILE: &str = "header_tracker.json";

/// Lifecycle of a claim: `claimed` while the claimer's unit is in flight,
/// `completed` once its extraction finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Claimed,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderClaim {
    pub claimer_source: String,
    pub content_hash: String,
    pub state: ClaimState,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    compile_commands_hash: String,
    claims: Vec<(String, HeaderClaim)>,
    timestamp: i64,
}

/// Process-wide "first source to claim this header wins" registry.
#[derive(Debug, Default)]
pub struct HeaderClaimTracker {
    claims: DashMap<String, HeaderClaim>,
}

impl HeaderClaimTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim a header for `source`. Returns false when any entry
    /// already exists, claimed or completed.
    pub fn try_claim(&self, header: &str, source: &str, content_hash: &str) -> bool {
        let mut won = false;
        self.claims.entry(header.to_string()).or_insert_with(|| {
            won = true;
            HeaderClaim {
                claimer_source: source.to_string(),
                content_hash: content_hash.to_string(),
                state: ClaimState::Claimed,
            }
        });
        won
    }

    /// Transition the claimer's entry to completed.
    pub fn mark_completed(&self, header: &str, content_hash: &str) {
        if let Some(mut entry) = self.claims.get_mut(header) {
            entry.state = ClaimState::Completed;
            entry.content_hash = content_hash.to_string();
        }
    }

    pub fn get(&self, header: &str) -> Option<HeaderClaim> {
        self.claims.get(header).map(|e| e.clone())
    }

    pub fn is_claimed(&self, header: &str) -> bool {
        self.claims.contains_key(header)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn clear(&self) {
        self.claims.clear();
    }

    /// Drop all claims owned by `source` (used when a source file is
    /// deleted, so its headers can be re-claimed by another unit).
    pub fn release_claims_of(&self, source: &str) -> Vec<String> {
        let released: Vec<String> = self
            .claims
            .iter()
            .filter(|entry| entry.value().claimer_source == source)
            .map(|entry| entry.key().clone())
            .collect();
        for header in &released {
            self.claims.remove(header);
        }
        released
    }

    /// Drop the claim on a specific header.
    pub fn release(&self, header: &str) {
        self.claims.remove(header);
    }

    /// Restore from the snapshot in `cache_dir` if it was taken under the
    /// same compilation-database hash; otherwise start empty. A corrupt
    /// snapshot is treated as absent.
    pub fn restore(cache_dir: &std::path::Path, compile_commands_hash: &str) -> Self {
        let tracker = Self::new();
        let path = cache_dir.join(SNAPSHOT_FILE);
        let Some(snapshot) = cache::read_json_or_none::<Snapshot>(&path) else {
            return tracker;
        };
        if snapshot.compile_commands_hash != compile_commands_hash {
            tracing::debug!("Compilation database changed; resetting header claims");
            return tracker;
        }
        for (header, claim) in snapshot.claims {
            tracker.claims.insert(header, claim);
        }
        tracing::debug!("Restored {} header claims from snapshot", tracker.len());
        tracker
    }

    /// Persist the snapshot; called once at the end of an indexing or
    /// refresh pass.
    pub fn save(
        &self,
        cache_dir: &std::path::Path,
        compile_commands_hash: &str,
    ) -> crate::error::StorageResult<()> {
        let snapshot = Snapshot {
            version: 1,
            compile_commands_hash: compile_commands_hash.to_string(),
            claims: self
                .claims
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        cache::write_json_atomic(&cache_dir.join(SNAPSHOT_FILE), &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_claim_wins() {
        let tracker = HeaderClaimTracker::new();
        assert!(tracker.try_claim("shared.h", "s1.cpp", "hash"));
        assert!(!tracker.try_claim("shared.h", "s2.cpp", "hash"));

        let claim = tracker.get("shared.h").unwrap();
        assert_eq!(claim.claimer_source, "s1.cpp");
        assert_eq!(claim.state, ClaimState::Claimed);

        tracker.mark_completed("shared.h", "hash");
        assert_eq!(tracker.get("shared.h").unwrap().state, ClaimState::Completed);
        // Completed headers stay claimed.
        assert!(!tracker.try_claim("shared.h", "s3.cpp", "hash"));
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let tracker = std::sync::Arc::new(HeaderClaimTracker::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let tracker = tracker.clone();
            handles.push(std::thread::spawn(move || {
                tracker.try_claim("hot.h", &format!("s{i}.cpp"), "h")
            }));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }

    #[test]
    fn snapshot_round_trip_and_hash_keying() {
        let dir = TempDir::new().unwrap();
        let tracker = HeaderClaimTracker::new();
        tracker.try_claim("a.h", "a.cpp", "h1");
        tracker.mark_completed("a.h", "h1");
        tracker.save(dir.path(), "db-hash").unwrap();

        let same = HeaderClaimTracker::restore(dir.path(), "db-hash");
        assert_eq!(same.len(), 1);
        assert_eq!(same.get("a.h").unwrap().state, ClaimState::Completed);

        // A different database hash clears all claims.
        let changed = HeaderClaimTracker::restore(dir.path(), "other-hash");
        assert!(changed.is_empty());
    }

    #[test]
    fn corrupt_snapshot_starts_fresh() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SNAPSHOT_FILE), "not json at all").unwrap();
        let tracker = HeaderClaimTracker::restore(dir.path(), "h");
        assert!(tracker.is_empty());
    }

    #[test]
    fn releasing_a_source_frees_its_headers() {
        let tracker = HeaderClaimTracker::new();
        tracker.try_claim("a.h", "s1.cpp", "h");
        tracker.try_claim("b.h", "s1.cpp", "h");
        tracker.try_claim("c.h", "s2.cpp", "h");

        let released = tracker.release_claims_of("s1.cpp");
        assert_eq!(released.len(), 2);
        assert!(tracker.try_claim("a.h", "s3.cpp", "h"));
        assert!(!tracker.try_claim("c.h", "s3.cpp", "h"));
    }
}
