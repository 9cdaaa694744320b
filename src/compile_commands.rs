//! Compilation database loading and per-file argument resolution.
//!
//! Accepts the standard `compile_commands.json` format: an array of objects
//! with `file`, either `arguments` or `command`, and optionally `directory`.
//! `command` strings are tokenized with shell-quoting rules and stripped of
//! the compiler executable, `-o <file>`, `-c`, and trailing source-file
//! arguments, leaving only the flags the parser needs.

use crate::config::CompileCommandsConfig;
use crate::error::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Compiler executables recognized at the front of a `command` string.
const COMPILER_NAMES: &[&str] = &["gcc", "g++", "clang", "clang++", "cc", "c++", "cl", "cl.exe"];

/// Extensions identifying a trailing source-file argument.
const STRIPPED_SOURCE_EXTENSIONS: &[&str] = &[".c", ".cc", ".cpp", ".cxx", ".c++", ".m", ".mm"];

#[derive(Debug, Deserialize)]
struct DatabaseEntry {
    file: String,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    #[serde(default)]
    command: Option<String>,
}

/// Cached form of a parsed database, keyed by the source file's content hash.
#[derive(Debug, Serialize, Deserialize)]
struct ParsedDatabase {
    database_hash: String,
    commands: Vec<(PathBuf, Vec<String>)>,
}

/// Summary for diagnostics and the stats query.
#[derive(Debug, Clone, Serialize)]
pub struct CompileCommandsStats {
    pub enabled: bool,
    pub entry_count: usize,
    pub fallback_enabled: bool,
    pub database_path: PathBuf,
    pub database_present: bool,
}

/// Per-file argument vectors resolved from the compilation database.
pub struct CompileCommandsStore {
    project_root: PathBuf,
    config: CompileCommandsConfig,
    cache_dir: Option<PathBuf>,
    /// Absolute file path → argument vector. Duplicate database entries for
    /// one file keep the last occurrence (contractual).
    commands: HashMap<PathBuf, Vec<String>>,
    database_hash: String,
    fallback_args: Vec<String>,
}

impl CompileCommandsStore {
    pub fn new(
        project_root: PathBuf,
        config: CompileCommandsConfig,
        cache_dir: Option<PathBuf>,
    ) -> Self {
        let fallback_args = build_fallback_args(&project_root);
        let mut store = Self {
            project_root,
            config,
            cache_dir,
            commands: HashMap::new(),
            database_hash: String::new(),
            fallback_args,
        };
        if store.config.enabled {
            if let Err(e) = store.reload() {
                tracing::warn!("Compilation database unusable: {e}; using fallback arguments");
            }
        }
        store
    }

    pub fn database_path(&self) -> PathBuf {
        self.project_root.join(&self.config.path)
    }

    /// Content hash of the database file; empty when absent or disabled.
    /// Keys the header-claim snapshot.
    pub fn database_hash(&self) -> &str {
        &self.database_hash
    }

    pub fn has_entries(&self) -> bool {
        !self.commands.is_empty()
    }

    /// All files the database names, sorted for deterministic dispatch.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.commands.keys().cloned().collect();
        files.sort();
        files
    }

    /// Arguments for a file, without fallback.
    pub fn args_for(&self, path: &Path) -> Option<&[String]> {
        let abs = self.absolutize(path);
        self.commands.get(&abs).map(|v| v.as_slice())
    }

    /// Arguments for a file, falling back to the built-in vector (plus
    /// detected system include paths) when the database has no entry.
    pub fn args_with_fallback(&self, path: &Path) -> Vec<String> {
        if let Some(args) = self.args_for(path) {
            return args.to_vec();
        }
        if self.config.fallback_to_hardcoded {
            self.fallback_args.clone()
        } else {
            Vec::new()
        }
    }

    /// Reload the database from disk. Absent file is not an error; it
    /// clears the mapping and triggers fallback mode.
    pub fn reload(&mut self) -> IndexResult<bool> {
        let path = self.database_path();
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(_) => {
                self.commands.clear();
                self.database_hash.clear();
                tracing::info!(
                    "compile_commands.json not found at {}; using fallback compilation arguments",
                    path.display()
                );
                return Ok(false);
            }
        };

        let hash = content_hash(&raw);
        if self.config.cache_enabled
            && let Some(parsed) = self.load_parsed_cache(&hash)
        {
            self.commands = parsed.commands.into_iter().collect();
            self.database_hash = hash;
            tracing::debug!("Loaded {} compile commands from parse cache", self.commands.len());
            return Ok(true);
        }

        let value: serde_json::Value =
            serde_json::from_slice(&raw).map_err(|e| IndexError::MalformedCompilationDatabase {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let entries = value
            .as_array()
            .ok_or_else(|| IndexError::MalformedCompilationDatabase {
                path: path.clone(),
                reason: "top level must be a JSON array of commands".to_string(),
            })?;

        let mut commands = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            let entry: DatabaseEntry = match serde_json::from_value(entry.clone()) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping invalid compilation database entry {index}: {e}");
                    continue;
                }
            };
            let file = self.normalize_entry_path(&entry.file, entry.directory.as_deref());
            let args = match (entry.arguments, entry.command) {
                (Some(arguments), _) if !arguments.is_empty() => strip_arguments(arguments),
                (_, Some(command)) => parse_command_string(&command),
                _ => {
                    tracing::warn!(
                        "Skipping entry {index} for '{}': neither arguments nor command",
                        file.display()
                    );
                    continue;
                }
            };
            // Last entry wins when a file appears more than once.
            commands.insert(file, args);
        }

        tracing::info!(
            "Loaded {} compile commands from {}",
            commands.len(),
            path.display()
        );

        if self.config.cache_enabled {
            self.save_parsed_cache(&hash, &commands);
        }
        self.commands = commands;
        self.database_hash = hash;
        Ok(true)
    }

    /// Hash of an argument vector for cache validation. Order-insensitive,
    /// so equivalent vectors from `arguments` and `command` forms agree.
    pub fn args_hash(args: &[String]) -> String {
        let mut sorted: Vec<&String> = args.iter().collect();
        sorted.sort();
        let mut hasher = Sha256::new();
        for arg in sorted {
            hasher.update(arg.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn stats(&self) -> CompileCommandsStats {
        CompileCommandsStats {
            enabled: self.config.enabled,
            entry_count: self.commands.len(),
            fallback_enabled: self.config.fallback_to_hardcoded,
            database_present: self.database_path().exists(),
            database_path: self.database_path(),
        }
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };
        abs.canonicalize().unwrap_or(abs)
    }

    fn normalize_entry_path(&self, file: &str, directory: Option<&str>) -> PathBuf {
        let path = Path::new(file);
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            match directory {
                Some(dir) if Path::new(dir).is_absolute() => Path::new(dir).join(path),
                _ => self.project_root.join(path),
            }
        };
        abs.canonicalize().unwrap_or(abs)
    }

    fn parsed_cache_path(&self) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join("compile_commands.parsed.json"))
    }

    fn load_parsed_cache(&self, database_hash: &str) -> Option<ParsedDatabase> {
        let path = self.parsed_cache_path()?;
        let raw = std::fs::read_to_string(&path).ok()?;
        // Corrupt cache data is a miss, never an error.
        let parsed: ParsedDatabase = serde_json::from_str(&raw).ok()?;
        (parsed.database_hash == database_hash).then_some(parsed)
    }

    fn save_parsed_cache(&self, database_hash: &str, commands: &HashMap<PathBuf, Vec<String>>) {
        let Some(path) = self.parsed_cache_path() else {
            return;
        };
        let parsed = ParsedDatabase {
            database_hash: database_hash.to_string(),
            commands: commands.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        if let Err(e) = crate::cache::write_json_atomic(&path, &parsed) {
            tracing::debug!("Failed to cache parsed compilation database: {e}");
        }
    }
}

fn content_hash(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    format!("{:x}", hasher.finalize())
}

/// Tokenize a shell `command` string into the argument vector the parser
/// needs: compiler executable, `-o <file>`, `-c`, and trailing source files
/// are stripped.
pub fn parse_command_string(command: &str) -> Vec<String> {
    let Some(tokens) = shlex::split(command) else {
        tracing::warn!("Failed to tokenize command string: {command}");
        return Vec::new();
    };
    let mut args: Vec<String> = tokens.into_iter().filter(|t| !t.trim().is_empty()).collect();
    if args.is_empty() {
        return args;
    }

    if looks_like_compiler(&args[0]) {
        args.remove(0);
    }

    strip_arguments(args)
}

/// Drop `-o <file>`, `-c` and source-file operands from an argument vector.
fn strip_arguments(args: Vec<String>) -> Vec<String> {
    let mut filtered = Vec::with_capacity(args.len());
    let mut iter = args.into_iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "-o" {
            iter.next();
            continue;
        }
        if arg == "-c" {
            continue;
        }
        if !arg.starts_with('-') && is_source_operand(&arg) {
            continue;
        }
        filtered.push(arg);
    }
    filtered
}

fn looks_like_compiler(first: &str) -> bool {
    if first.starts_with('/') || first.starts_with('\\') {
        return true;
    }
    let basename = first
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(first)
        .to_ascii_lowercase();
    let basename = basename.strip_suffix(".exe").unwrap_or(basename.as_str());
    COMPILER_NAMES.contains(&basename)
}

fn is_source_operand(arg: &str) -> bool {
    let lower = arg.to_ascii_lowercase();
    STRIPPED_SOURCE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Built-in arguments for files without a database entry.
fn build_fallback_args(project_root: &Path) -> Vec<String> {
    let mut args = vec![
        "-std=c++17".to_string(),
        "-I.".to_string(),
        format!("-I{}", project_root.display()),
        format!("-I{}/src", project_root.display()),
        format!("-I{}/include", project_root.display()),
        "-Wno-pragma-once-outside-header".to_string(),
        "-Wno-unknown-pragmas".to_string(),
        "-Wno-deprecated-declarations".to_string(),
        "-x".to_string(),
        "c++".to_string(),
    ];
    for dir in ["/usr/local/include", "/usr/include"] {
        if Path::new(dir).is_dir() {
            args.push(format!("-isystem{dir}"));
        }
    }
    args
}

/// Extract include search paths (`-I`, `-isystem`, `-iquote`) from an
/// argument vector, resolved against the project root.
pub fn include_dirs(args: &[String], project_root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        let dir = if let Some(rest) = arg.strip_prefix("-I") {
            if rest.is_empty() {
                iter.next().cloned()
            } else {
                Some(rest.to_string())
            }
        } else if let Some(rest) = arg.strip_prefix("-isystem") {
            if rest.is_empty() {
                iter.next().cloned()
            } else {
                Some(rest.to_string())
            }
        } else if let Some(rest) = arg.strip_prefix("-iquote") {
            if rest.is_empty() {
                iter.next().cloned()
            } else {
                Some(rest.to_string())
            }
        } else {
            None
        };
        if let Some(dir) = dir {
            let path = Path::new(&dir);
            if path.is_absolute() {
                dirs.push(path.to_path_buf());
            } else {
                dirs.push(project_root.join(path));
            }
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileCommandsConfig;
    use std::fs;
    use tempfile::TempDir;

    fn store_for(root: &Path) -> CompileCommandsStore {
        CompileCommandsStore::new(root.to_path_buf(), CompileCommandsConfig::default(), None)
    }

    #[test]
    fn command_string_is_stripped() {
        let args = parse_command_string(
            "/usr/bin/clang++ -std=c++20 -Iinclude -DNDEBUG -c -o build/main.o src/main.cpp",
        );
        assert_eq!(args, vec!["-std=c++20", "-Iinclude", "-DNDEBUG"]);
    }

    #[test]
    fn quoted_arguments_survive_tokenization() {
        let args = parse_command_string(r#"g++ "-DGREETING=\"hello world\"" -c main.cpp"#);
        assert_eq!(args, vec![r#"-DGREETING="hello world""#]);
    }

    #[test]
    fn unknown_executable_is_kept() {
        // Not a recognized compiler and not an absolute path: keep it.
        let args = parse_command_string("ccache -Ifoo main.cpp");
        assert_eq!(args, vec!["ccache", "-Ifoo"]);
    }

    #[test]
    fn arguments_form_preferred_and_last_entry_wins() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("a.cpp"), "").unwrap();
        let db = serde_json::json!([
            {"file": "a.cpp", "directory": root.to_str().unwrap(),
             "arguments": ["clang++", "-std=c++14", "-c", "a.cpp"]},
            {"file": "a.cpp", "directory": root.to_str().unwrap(),
             "arguments": ["clang++", "-std=c++20", "-c", "a.cpp"]}
        ]);
        fs::write(root.join("compile_commands.json"), db.to_string()).unwrap();

        let store = store_for(&root);
        let args = store.args_for(&root.join("a.cpp")).unwrap();
        assert_eq!(args, ["-std=c++20"]);
        assert_eq!(store.files().len(), 1);
    }

    #[test]
    fn absent_database_enables_fallback() {
        let dir = TempDir::new().unwrap();
        let store = store_for(dir.path());
        assert!(!store.has_entries());
        let args = store.args_with_fallback(&dir.path().join("x.cpp"));
        assert!(args.iter().any(|a| a == "-std=c++17"));
    }

    #[test]
    fn non_array_database_is_malformed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("compile_commands.json"), "{\"file\": 1}").unwrap();
        let mut store = store_for(dir.path());
        assert!(matches!(
            store.reload(),
            Err(IndexError::MalformedCompilationDatabase { .. })
        ));
    }

    #[test]
    fn bad_entries_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("b.cpp"), "").unwrap();
        let db = serde_json::json!([
            42,
            {"notfile": "x"},
            {"file": "b.cpp", "command": "g++ -std=c++17 -c b.cpp"}
        ]);
        fs::write(root.join("compile_commands.json"), db.to_string()).unwrap();

        let store = store_for(&root);
        assert_eq!(store.files().len(), 1);
        assert_eq!(store.args_for(&root.join("b.cpp")).unwrap(), ["-std=c++17"]);
    }

    #[test]
    fn args_hash_is_order_insensitive() {
        let a = ["-DA".to_string(), "-DB".to_string()];
        let b = ["-DB".to_string(), "-DA".to_string()];
        let c = ["-DB".to_string(), "-DC".to_string()];
        assert_eq!(CompileCommandsStore::args_hash(&a), CompileCommandsStore::args_hash(&b));
        assert_ne!(CompileCommandsStore::args_hash(&a), CompileCommandsStore::args_hash(&c));
    }

    #[test]
    fn include_dirs_resolve_against_root() {
        let args = vec![
            "-Iinclude".to_string(),
            "-I".to_string(),
            "/abs/path".to_string(),
            "-isystem/usr/include".to_string(),
        ];
        let dirs = include_dirs(&args, Path::new("/proj"));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/proj/include"),
                PathBuf::from("/abs/path"),
                PathBuf::from("/usr/include"),
            ]
        );
    }
}
