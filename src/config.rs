//! Layered configuration for the analyzer.
//!
//! Sources, lowest to highest precedence:
//! - built-in defaults
//! - the project's `.cpp-analyzer-config.json`
//! - environment variables prefixed with `CPP_ANALYZER_` (double underscore
//!   separates nested levels: `CPP_ANALYZER_DIAGNOSTICS__LEVEL=debug`)
//!
//! The `CPP_ANALYZER_CONFIG` environment variable may point at an absolute
//! config path and wins over the project-root file. A file whose top level
//! is not a JSON object is rejected with a warning and defaults are used.

use crate::types::QueryPolicy;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Conventional configuration file name in the project root.
pub const CONFIG_FILENAME: &str = ".cpp-analyzer-config.json";

/// Environment variable pointing at an absolute config file path.
pub const CONFIG_ENV_VAR: &str = "CPP_ANALYZER_CONFIG";

/// Environment variable overriding `query_behavior`.
pub const QUERY_BEHAVIOR_ENV_VAR: &str = "CPP_ANALYZER_QUERY_BEHAVIOR";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Directory names never entered during scanning.
    #[serde(default = "default_exclude_directories")]
    pub exclude_directories: Vec<String>,

    /// Directories holding third-party code; their files are indexable but
    /// never classified as project files.
    #[serde(default = "default_dependency_directories")]
    pub dependency_directories: Vec<String>,

    /// Glob patterns for files to skip entirely.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Whether dependency directories are scanned at all.
    #[serde(default = "default_true")]
    pub include_dependencies: bool,

    /// Files larger than this are recorded as failures and skipped.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: f64,

    /// A failing file is retried this many times, then skipped until its
    /// content hash changes.
    #[serde(default = "default_max_parse_retries")]
    pub max_parse_retries: u32,

    /// Behavior of queries that arrive while indexing.
    #[serde(default)]
    pub query_behavior: QueryPolicy,

    /// Worker cap; defaults to the CPU count.
    #[serde(default)]
    pub max_workers: Option<usize>,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub compile_commands: CompileCommandsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiagnosticsConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CompileCommandsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path of the database, relative to the project root.
    #[serde(default = "default_compile_commands_path")]
    pub path: String,
    /// Cache the parsed database keyed by its content hash.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Use built-in arguments for files without a database entry.
    #[serde(default = "default_true")]
    pub fallback_to_hardcoded: bool,
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,
    #[serde(default = "default_cache_expiry_seconds")]
    pub cache_expiry_seconds: u64,
}

fn default_true() -> bool {
    true
}
fn default_max_file_size_mb() -> f64 {
    10.0
}
fn default_max_parse_retries() -> u32 {
    2
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_compile_commands_path() -> String {
    "compile_commands.json".to_string()
}
fn default_cache_expiry_seconds() -> u64 {
    300
}

fn default_exclude_directories() -> Vec<String> {
    [
        ".git",
        ".svn",
        ".hg",
        "node_modules",
        "__pycache__",
        ".vs",
        ".vscode",
        ".idea",
        "CMakeFiles",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_dependency_directories() -> Vec<String> {
    [
        "vcpkg_installed",
        "third_party",
        "ThirdParty",
        "external",
        "External",
        "vendor",
        "dependencies",
        "packages",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_supported_extensions() -> Vec<String> {
    [
        ".cpp", ".cc", ".cxx", ".c++", ".c", ".h", ".hpp", ".hxx", ".h++", ".hh",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exclude_directories: default_exclude_directories(),
            dependency_directories: default_dependency_directories(),
            exclude_patterns: Vec::new(),
            include_dependencies: true,
            max_file_size_mb: default_max_file_size_mb(),
            max_parse_retries: default_max_parse_retries(),
            query_behavior: QueryPolicy::default(),
            max_workers: None,
            diagnostics: DiagnosticsConfig::default(),
            compile_commands: CompileCommandsConfig::default(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            enabled: true,
        }
    }
}

impl Default for CompileCommandsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_compile_commands_path(),
            cache_enabled: true,
            fallback_to_hardcoded: true,
            supported_extensions: default_supported_extensions(),
            cache_expiry_seconds: default_cache_expiry_seconds(),
        }
    }
}

impl Settings {
    /// Load configuration for a project root.
    ///
    /// Returns the settings and the config path that was actually used, so
    /// the project identity can incorporate it.
    pub fn load(project_root: &Path) -> (Self, Option<PathBuf>) {
        let config_path = Self::find_config_file(project_root);

        let mut settings = match &config_path {
            Some(path) => match Self::load_from(path) {
                Ok(settings) => settings,
                Err(reason) => {
                    tracing::warn!("{reason}; using default configuration");
                    Self::env_only()
                }
            },
            None => Self::env_only(),
        };

        if let Ok(policy) = std::env::var(QUERY_BEHAVIOR_ENV_VAR) {
            match QueryPolicy::parse(policy.to_lowercase().as_str()) {
                Some(policy) => settings.query_behavior = policy,
                None => tracing::warn!(
                    "Invalid {QUERY_BEHAVIOR_ENV_VAR} value '{policy}', keeping configured policy"
                ),
            }
        }

        (settings, config_path)
    }

    /// Load from an explicit file, validating the top-level shape first.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read configuration file '{}': {e}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| format!("Invalid JSON in '{}': {e}", path.display()))?;
        if !value.is_object() {
            return Err(format!(
                "Invalid config file format at '{}': expected a JSON object, got {}",
                path.display(),
                json_type_name(&value)
            ));
        }

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(env_provider())
            .extract()
            .map_err(|e| format!("Configuration error in '{}': {e}", path.display()))
    }

    fn env_only() -> Self {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(env_provider())
            .extract()
            .unwrap_or_default()
    }

    /// Locate the config file: `CPP_ANALYZER_CONFIG` first, then the
    /// project root.
    pub fn find_config_file(project_root: &Path) -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!(
                "{CONFIG_ENV_VAR} points to non-existent file: {}",
                path.display()
            );
        }

        let project_config = project_root.join(CONFIG_FILENAME);
        project_config.exists().then_some(project_config)
    }

    /// Worker count after applying the configured cap.
    pub fn effective_workers(&self) -> usize {
        let cpus = num_cpus::get().max(1);
        match self.max_workers {
            Some(n) if n > 0 => n.min(cpus),
            _ => cpus,
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        (self.max_file_size_mb * 1024.0 * 1024.0) as u64
    }

    /// Write a commented example configuration into the project root.
    pub fn write_example_config(project_root: &Path, force: bool) -> Result<PathBuf, String> {
        let target = project_root.join(CONFIG_FILENAME);
        if target.exists() && !force {
            return Err(format!(
                "Configuration file already exists at '{}'. Use --force to overwrite",
                target.display()
            ));
        }

        let example = serde_json::json!({
            "_comment": "cppscope configuration file",
            "exclude_directories": [".git", ".svn", "node_modules", "build", "Build"],
            "exclude_patterns": ["*.generated.h", "*.generated.cpp"],
            "dependency_directories": ["vcpkg_installed", "third_party", "external"],
            "include_dependencies": true,
            "max_file_size_mb": 10,
            "max_parse_retries": 2,
            "query_behavior": "allow_partial",
            "_query_behavior_options": [
                "allow_partial - answer from the partial index while indexing",
                "block - wait for indexing to complete",
                "reject - fail queries that arrive during indexing"
            ],
            "compile_commands": {
                "enabled": true,
                "path": "compile_commands.json",
                "cache_enabled": true,
                "fallback_to_hardcoded": true,
                "cache_expiry_seconds": 300
            },
            "diagnostics": {"level": "info", "enabled": true}
        });
        let pretty = serde_json::to_string_pretty(&example)
            .map_err(|e| format!("Failed to render example config: {e}"))?;
        std::fs::write(&target, pretty)
            .map_err(|e| format!("Failed to write '{}': {e}", target.display()))?;
        Ok(target)
    }

    /// Fingerprint of the effective configuration, stored in cache metadata
    /// so a config change invalidates the cache snapshot.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let serialized = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn env_provider() -> Env {
    Env::prefixed("CPP_ANALYZER_")
        .ignore(&["CONFIG", "QUERY_BEHAVIOR"])
        .map(|key| key.as_str().to_lowercase().replace("__", ".").into())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
