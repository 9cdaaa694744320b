//! `#include` scanning and resolution.
//!
//! The extractor never descends into files it cannot resolve inside the
//! project; unresolvable includes are system headers by definition here.

use std::path::{Path, PathBuf};
use tree_sitter::Node;

/// One `#include` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    /// Path as spelled between the delimiters.
    pub path: String,
    /// True for `<...>`, false for `"..."`.
    pub system: bool,
}

/// Collect every `#include` in a parsed file, including those nested under
/// preprocessor conditionals.
pub fn scan_includes(root: Node, code: &str) -> Vec<IncludeDirective> {
    let mut includes = Vec::new();
    collect(root, code, &mut includes, 0);
    includes
}

fn collect(node: Node, code: &str, out: &mut Vec<IncludeDirective>, depth: usize) {
    if depth > super::MAX_AST_DEPTH {
        return;
    }
    if node.kind() == "preproc_include"
        && let Some(path_node) = node.child_by_field_name("path")
    {
        let raw = &code[path_node.byte_range()];
        let system = raw.starts_with('<');
        let path = raw
            .trim_matches(|c| c == '"' || c == '<' || c == '>')
            .to_string();
        if !path.is_empty() {
            out.push(IncludeDirective { path, system });
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect(child, code, out, depth + 1);
    }
}

/// Resolves include directives against the including file's directory, the
/// project root, and the `-I`/`-isystem`/`-iquote` paths of the unit's
/// argument vector.
pub struct IncludeResolver {
    project_root: PathBuf,
    include_dirs: Vec<PathBuf>,
}

impl IncludeResolver {
    pub fn new(project_root: PathBuf, include_dirs: Vec<PathBuf>) -> Self {
        Self {
            project_root,
            include_dirs,
        }
    }

    /// Resolve a directive to an existing file, or `None` for headers that
    /// live outside the reachable search path (system headers).
    pub fn resolve(&self, directive: &IncludeDirective, including_file: &Path) -> Option<PathBuf> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if !directive.system
            && let Some(dir) = including_file.parent()
        {
            candidates.push(dir.join(&directive.path));
        }
        for dir in &self.include_dirs {
            candidates.push(dir.join(&directive.path));
        }
        candidates.push(self.project_root.join(&directive.path));

        candidates
            .into_iter()
            .find(|c| c.is_file())
            .map(|c| c.canonicalize().unwrap_or(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(code: &str) -> (tree_sitter::Tree, String) {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_cpp::LANGUAGE.into())
            .unwrap();
        (parser.parse(code, None).unwrap(), code.to_string())
    }

    #[test]
    fn scans_quote_and_angle_forms() {
        let code = "#include \"local.h\"\n#include <vector>\n#ifdef X\n#include \"cond.h\"\n#endif\n";
        let (tree, code) = parse(code);
        let includes = scan_includes(tree.root_node(), &code);
        assert_eq!(includes.len(), 3);
        assert_eq!(
            includes[0],
            IncludeDirective {
                path: "local.h".into(),
                system: false
            }
        );
        assert!(includes[1].system);
        assert_eq!(includes[2].path, "cond.h");
    }

    #[test]
    fn resolution_prefers_including_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("sub/near.h"), "").unwrap();
        fs::write(root.join("near.h"), "").unwrap();
        fs::write(root.join("only_root.h"), "").unwrap();

        let resolver = IncludeResolver::new(root.clone(), vec![]);
        let from = root.join("sub/main.cpp");

        let near = IncludeDirective {
            path: "near.h".into(),
            system: false,
        };
        assert_eq!(resolver.resolve(&near, &from).unwrap(), root.join("sub/near.h"));

        let root_only = IncludeDirective {
            path: "only_root.h".into(),
            system: false,
        };
        assert_eq!(
            resolver.resolve(&root_only, &from).unwrap(),
            root.join("only_root.h")
        );

        let missing = IncludeDirective {
            path: "no/such/file.h".into(),
            system: true,
        };
        assert!(resolver.resolve(&missing, &from).is_none());
    }

    #[test]
    fn include_dirs_serve_system_form() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("include/lib")).unwrap();
        fs::write(root.join("include/lib/api.h"), "").unwrap();

        let resolver = IncludeResolver::new(root.clone(), vec![root.join("include")]);
        let directive = IncludeDirective {
            path: "lib/api.h".into(),
            system: true,
        };
        assert_eq!(
            resolver.resolve(&directive, &root.join("main.cpp")).unwrap(),
            root.join("include/lib/api.h")
        );
    }
}
