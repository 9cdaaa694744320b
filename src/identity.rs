//! Stable cache namespace per (project root, config file) pair.
//!
//! Two projects, or the same project under different configuration files,
//! never share a parse cache.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Identity of an analyzed project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    source_root: PathBuf,
    config_path: Option<PathBuf>,
}

impl ProjectIdentity {
    /// Canonicalizes both paths; paths that do not resolve are used as
    /// given so an identity can still be formed for a vanished config.
    pub fn new(source_root: &Path, config_path: Option<&Path>) -> Self {
        Self {
            source_root: canonical_or_owned(source_root),
            config_path: config_path.map(canonical_or_owned),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Stable directory name derived from the identity pair.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_root.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        if let Some(config) = &self.config_path {
            hasher.update(config.to_string_lossy().as_bytes());
        }
        let digest = hasher.finalize();
        let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        let stem = self
            .source_root
            .file_name()
            .map(|n| sanitize(&n.to_string_lossy()))
            .unwrap_or_else(|| "project".to_string());
        format!("{stem}-{hex}")
    }

    /// Cache directory under the user-scoped cache root.
    pub fn cache_dir(&self) -> PathBuf {
        let base = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("cppscope");
        base.join(self.cache_key())
    }
}

fn canonical_or_owned(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(40)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn different_roots_differ() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let ia = ProjectIdentity::new(a.path(), None);
        let ib = ProjectIdentity::new(b.path(), None);
        assert_ne!(ia.cache_key(), ib.cache_key());
    }

    #[test]
    fn config_file_changes_identity() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("alt-config.json");
        std::fs::write(&config, "{}").unwrap();

        let plain = ProjectIdentity::new(dir.path(), None);
        let configured = ProjectIdentity::new(dir.path(), Some(&config));
        assert_ne!(plain.cache_key(), configured.cache_key());
    }

    #[test]
    fn cache_key_is_stable() {
        let dir = TempDir::new().unwrap();
        let a = ProjectIdentity::new(dir.path(), None);
        let b = ProjectIdentity::new(dir.path(), None);
        assert_eq!(a.cache_key(), b.cache_key());
        assert!(a.cache_dir().ends_with(a.cache_key()));
    }
}
