//! Pattern matching and hierarchy queries over the in-memory indexes.
//!
//! Pattern classification:
//! - empty matches everything;
//! - a leading `::` demands an exact qualified-name match in the global
//!   namespace;
//! - an embedded `::` is a suffix match on `::`-component boundaries
//!   (`ns::Foo` matches `outer::ns::Foo` but not `other::ns::Foo2`);
//! - anything else is a case-insensitive regex fullmatch on the simple name.

use crate::error::{IndexError, IndexResult};
use crate::indexing::indexes::SymbolIndexes;
use crate::symbol::Symbol;
use crate::types::SymbolKind;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Compiled qualified-name pattern.
pub enum NamePattern {
    Everything,
    /// `::Foo`: exact qualified name, global namespace only.
    ExactGlobal(String),
    /// `ns::Foo`: suffix match on component boundaries.
    QualifiedSuffix(String),
    /// Case-insensitive regex fullmatch against the simple name.
    Simple(Regex),
}

impl NamePattern {
    pub fn compile(pattern: &str) -> IndexResult<Self> {
        if pattern.is_empty() {
            return Ok(Self::Everything);
        }
        if let Some(stripped) = pattern.strip_prefix("::") {
            return Ok(Self::ExactGlobal(stripped.to_string()));
        }
        if pattern.contains("::") {
            return Ok(Self::QualifiedSuffix(pattern.to_string()));
        }
        match Regex::new(&format!("(?i)^(?:{pattern})$")) {
            Ok(regex) => Ok(Self::Simple(regex)),
            Err(e) => {
                // A plain identifier that fails to compile can still match
                // by short name; anything else is caller error.
                if pattern.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    Ok(Self::QualifiedSuffix(pattern.to_string()))
                } else {
                    Err(IndexError::InvalidInput {
                        reason: format!("invalid pattern '{pattern}': {e}"),
                    })
                }
            }
        }
    }

    pub fn matches(&self, symbol: &Symbol) -> bool {
        match self {
            Self::Everything => true,
            Self::ExactGlobal(name) => symbol.qualified_name == *name,
            Self::QualifiedSuffix(suffix) => {
                symbol.qualified_name == *suffix
                    || symbol
                        .qualified_name
                        .ends_with(&format!("::{suffix}"))
            }
            Self::Simple(regex) => regex.is_match(&symbol.name),
        }
    }
}

/// Post-match filters shared by the search operations.
#[derive(Debug, Default, Clone)]
pub struct SearchFilters {
    pub project_only: bool,
    /// Exact, case-sensitive; empty string means global namespace.
    pub namespace: Option<String>,
    /// Basename or path-suffix match on declaration or definition file.
    pub file_name: Option<String>,
    /// Method filter; qualified input is normalized to its last component
    /// because `parent_class` stores simple names.
    pub class_name: Option<String>,
    pub symbol_types: Option<Vec<SymbolKind>>,
    pub max_results: Option<usize>,
}

/// Search results plus the pre-cap total.
#[derive(Debug, Serialize)]
pub struct SearchOutcome {
    pub symbols: Vec<Arc<Symbol>>,
    pub total: usize,
}

fn passes_filters(symbol: &Symbol, filters: &SearchFilters, project_root: Option<&Path>) -> bool {
    if filters.project_only && !symbol.is_project {
        return false;
    }
    if let Some(ns) = &filters.namespace
        && symbol.namespace != *ns
    {
        return false;
    }
    if let Some(kinds) = &filters.symbol_types
        && !kinds.contains(&symbol.kind)
    {
        return false;
    }
    if let Some(class) = &filters.class_name {
        let wanted = class.rsplit("::").next().unwrap_or(class);
        if symbol.parent_class != wanted {
            return false;
        }
    }
    if let Some(file) = &filters.file_name {
        let primary = file_matches(&symbol.file, file, project_root);
        let header = symbol
            .header_file
            .as_deref()
            .is_some_and(|h| file_matches(h, file, project_root));
        if !primary && !header {
            return false;
        }
    }
    true
}

/// Suffix/basename semantics of the `file_name` filter; relative paths
/// under the project root are also accepted. Multiple indexed files sharing
/// a basename all match.
fn file_matches(candidate: &str, filter: &str, project_root: Option<&Path>) -> bool {
    if candidate == filter {
        return true;
    }
    let candidate_path = Path::new(candidate);
    if candidate_path
        .file_name()
        .is_some_and(|n| n.to_string_lossy() == filter)
    {
        return true;
    }
    let normalized = filter.trim_start_matches("./");
    if candidate.ends_with(&format!("/{normalized}")) {
        return true;
    }
    if let Some(root) = project_root {
        let joined = root.join(normalized);
        if joined.to_string_lossy() == candidate {
            return true;
        }
    }
    false
}

fn collect<'a>(
    source: impl Iterator<Item = &'a Arc<Symbol>>,
    pattern: &NamePattern,
    filters: &SearchFilters,
    project_root: Option<&Path>,
) -> SearchOutcome {
    let mut symbols: Vec<Arc<Symbol>> = source
        .filter(|s| pattern.matches(s))
        .filter(|s| passes_filters(s, filters, project_root))
        .cloned()
        .collect();
    symbols.sort_by(|a, b| {
        a.qualified_name
            .cmp(&b.qualified_name)
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.line.cmp(&b.line))
    });
    let total = symbols.len();
    if let Some(cap) = filters.max_results {
        symbols.truncate(cap);
    }
    SearchOutcome { symbols, total }
}

/// Matching class-like symbols.
pub fn search_classes(
    indexes: &SymbolIndexes,
    pattern: &str,
    filters: &SearchFilters,
    project_root: Option<&Path>,
) -> IndexResult<SearchOutcome> {
    let pattern = NamePattern::compile(pattern)?;
    Ok(collect(indexes.classes(), &pattern, filters, project_root))
}

/// Matching function-like symbols.
pub fn search_functions(
    indexes: &SymbolIndexes,
    pattern: &str,
    filters: &SearchFilters,
    project_root: Option<&Path>,
) -> IndexResult<SearchOutcome> {
    let pattern = NamePattern::compile(pattern)?;
    Ok(collect(indexes.functions(), &pattern, filters, project_root))
}

/// Resolve a class name (qualified rules) to its best record: the
/// definition when one exists.
pub fn resolve_class(indexes: &SymbolIndexes, name: &str) -> IndexResult<Option<Arc<Symbol>>> {
    let pattern = NamePattern::compile(name)?;
    let mut matches: Vec<&Arc<Symbol>> =
        indexes.classes().filter(|s| pattern.matches(s)).collect();
    matches.sort_by_key(|s| (!s.is_definition, s.qualified_name.clone()));
    Ok(matches.first().map(|s| (*s).clone()))
}

// --- derived classes -------------------------------------------------------

/// Template-aware derived-class query. A class derives from `base` when any
/// of its base spellings matches exactly, as a specialization prefix
/// (`base<`), as a qualified suffix (`::base` / `::base<`), or indirectly
/// through template-parameter inheritance.
pub fn derived_classes(
    indexes: &SymbolIndexes,
    base: &str,
    project_only: bool,
) -> Vec<Arc<Symbol>> {
    let mut result: Vec<Arc<Symbol>> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for symbol in indexes.classes() {
        if project_only && !symbol.is_project {
            continue;
        }
        if symbol
            .base_classes
            .iter()
            .any(|b| base_matches(indexes, b, base, 0))
        {
            let key = if symbol.usr.is_empty() {
                format!("{}:{}:{}", symbol.qualified_name, symbol.file, symbol.line)
            } else {
                symbol.usr.clone()
            };
            if seen.insert(key) {
                result.push(symbol.clone());
            }
        }
    }
    result.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
    result
}

fn base_matches(indexes: &SymbolIndexes, spelling: &str, base: &str, depth: usize) -> bool {
    if depth > 8 {
        return false;
    }
    if spelling == base
        || spelling.starts_with(&format!("{base}<"))
        || spelling.ends_with(&format!("::{base}"))
        || spelling.contains(&format!("::{base}<"))
    {
        return true;
    }

    // Indirect match: the class inherits `Tmpl<X, Y>` and Tmpl itself
    // inherits from its I-th template parameter.
    let Some(open) = spelling.find('<') else {
        return false;
    };
    if !spelling.ends_with('>') {
        return false;
    }
    let template_name = spelling[..open].rsplit("::").next().unwrap_or(&spelling[..open]);
    let args = parse_template_args(&spelling[open + 1..spelling.len() - 1]);
    for index in template_param_inheritance_indices(indexes, template_name) {
        if let Some(arg) = args.get(index)
            && base_matches(indexes, arg, base, depth + 1)
        {
            return true;
        }
    }
    false
}

/// Indices I for which the named class template inherits from its own I-th
/// template parameter, signaled by `type-parameter-0-I` base spellings.
fn template_param_inheritance_indices(indexes: &SymbolIndexes, template_name: &str) -> Vec<usize> {
    let mut indices = Vec::new();
    if let Some(entries) = indexes.class_index.get(template_name) {
        for symbol in entries {
            if symbol.kind != SymbolKind::ClassTemplate {
                continue;
            }
            for b in &symbol.base_classes {
                if let Some(rest) = b.strip_prefix("type-parameter-0-")
                    && let Ok(index) = rest.parse::<usize>()
                {
                    indices.push(index);
                }
            }
        }
    }
    indices
}

/// Split a template argument list at top-level commas.
pub fn parse_template_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in args.chars() {
        match ch {
            '<' | '(' | '[' => {
                depth += 1;
                current.push(ch);
            }
            '>' | ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                let trimmed = current.trim().to_string();
                if !trimmed.is_empty() {
                    out.push(trimmed);
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
    out
}

// --- hierarchy -------------------------------------------------------------

/// One node of a hierarchy traversal; cycles surface as marked nodes
/// instead of looping.
#[derive(Debug, Serialize)]
pub struct HierarchyNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub circular_reference: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyNode>,
}

#[derive(Debug, Serialize)]
pub struct ClassHierarchy {
    pub class: Arc<Symbol>,
    /// Direct and recursive ancestors.
    pub bases: Vec<HierarchyNode>,
    /// Direct and recursive descendants.
    pub derived: Vec<HierarchyNode>,
}

pub fn class_hierarchy(indexes: &SymbolIndexes, name: &str) -> IndexResult<ClassHierarchy> {
    let Some(class) = resolve_class(indexes, name)? else {
        return Err(IndexError::SymbolNotFound {
            name: name.to_string(),
        });
    };
    let mut visited = HashSet::new();
    visited.insert(class.qualified_name.clone());
    let bases = base_hierarchy(indexes, &class, &mut visited);

    let mut visited = HashSet::new();
    visited.insert(class.qualified_name.clone());
    let derived = derived_hierarchy(indexes, &class, &mut visited);

    Ok(ClassHierarchy {
        class,
        bases,
        derived,
    })
}

fn base_hierarchy(
    indexes: &SymbolIndexes,
    class: &Arc<Symbol>,
    visited: &mut HashSet<String>,
) -> Vec<HierarchyNode> {
    let mut nodes = Vec::new();
    for spelling in &class.base_classes {
        let simple = base_simple_name(spelling);
        match lookup_class_by_spelling(indexes, spelling) {
            Some(base) => {
                if !visited.insert(base.qualified_name.clone()) {
                    nodes.push(HierarchyNode {
                        name: simple,
                        qualified_name: Some(base.qualified_name.clone()),
                        circular_reference: true,
                        children: Vec::new(),
                    });
                    continue;
                }
                let children = base_hierarchy(indexes, &base, visited);
                visited.remove(&base.qualified_name);
                nodes.push(HierarchyNode {
                    name: simple,
                    qualified_name: Some(base.qualified_name.clone()),
                    circular_reference: false,
                    children,
                });
            }
            None => nodes.push(HierarchyNode {
                // External base (std::, third-party): leaf node.
                name: simple,
                qualified_name: None,
                circular_reference: false,
                children: Vec::new(),
            }),
        }
    }
    nodes
}

fn derived_hierarchy(
    indexes: &SymbolIndexes,
    class: &Arc<Symbol>,
    visited: &mut HashSet<String>,
) -> Vec<HierarchyNode> {
    let mut nodes = Vec::new();
    for derived in derived_classes(indexes, &class.name, false) {
        if derived.qualified_name == class.qualified_name {
            continue;
        }
        if !visited.insert(derived.qualified_name.clone()) {
            nodes.push(HierarchyNode {
                name: derived.name.clone(),
                qualified_name: Some(derived.qualified_name.clone()),
                circular_reference: true,
                children: Vec::new(),
            });
            continue;
        }
        let children = derived_hierarchy(indexes, &derived, visited);
        visited.remove(&derived.qualified_name);
        nodes.push(HierarchyNode {
            name: derived.name.clone(),
            qualified_name: Some(derived.qualified_name.clone()),
            circular_reference: false,
            children,
        });
    }
    nodes
}

fn base_simple_name(spelling: &str) -> String {
    let no_args = spelling.split('<').next().unwrap_or(spelling);
    no_args
        .rsplit("::")
        .next()
        .unwrap_or(no_args)
        .trim()
        .to_string()
}

fn lookup_class_by_spelling(indexes: &SymbolIndexes, spelling: &str) -> Option<Arc<Symbol>> {
    let no_args = spelling.split('<').next().unwrap_or(spelling).trim();
    let simple = no_args.rsplit("::").next().unwrap_or(no_args);
    let entries = indexes.class_index.get(simple)?;
    // Prefer a definition whose qualified name agrees with the spelling.
    let mut best: Option<&Arc<Symbol>> = None;
    for symbol in entries {
        let qualified_ok =
            symbol.qualified_name == no_args || symbol.qualified_name.ends_with(&format!("::{no_args}")) || no_args == simple;
        if !qualified_ok {
            continue;
        }
        match best {
            Some(current) if current.is_definition || !symbol.is_definition => {}
            _ => best = Some(symbol),
        }
    }
    best.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::indexes::SymbolIndexes;
    use crate::symbol::Symbol;

    fn add_class(idx: &mut SymbolIndexes, qualified: &str, bases: &[&str], kind: SymbolKind) {
        let name = qualified.rsplit("::").next().unwrap().to_string();
        let usr = format!("c:@S@{qualified}");
        let mut s = Symbol::new(name, kind, usr, "/p/a.h", 1, 1);
        s.qualified_name = qualified.to_string();
        s.namespace = qualified
            .rsplit_once("::")
            .map(|(ns, _)| ns.to_string())
            .unwrap_or_default();
        s.base_classes = bases.iter().map(|b| b.to_string()).collect();
        s.is_definition = true;
        s.is_project = true;
        idx.merge(s);
    }

    #[test]
    fn qualified_pattern_precision() {
        let mut idx = SymbolIndexes::new();
        add_class(&mut idx, "app::ui::View", &[], SymbolKind::Class);
        add_class(&mut idx, "app::core::View", &[], SymbolKind::Class);

        let filters = SearchFilters::default();
        let both = search_classes(&idx, "View", &filters, None).unwrap();
        assert_eq!(both.total, 2);

        let ui_only = search_classes(&idx, "ui::View", &filters, None).unwrap();
        assert_eq!(ui_only.total, 1);
        assert_eq!(ui_only.symbols[0].qualified_name, "app::ui::View");

        let global = search_classes(&idx, "::View", &filters, None).unwrap();
        assert_eq!(global.total, 0);
    }

    #[test]
    fn suffix_matching_respects_component_boundaries() {
        let mut idx = SymbolIndexes::new();
        add_class(&mut idx, "outer::ns::Foo", &[], SymbolKind::Class);
        add_class(&mut idx, "other::ns::Foo2", &[], SymbolKind::Class);

        let hits = search_classes(&idx, "ns::Foo", &SearchFilters::default(), None).unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.symbols[0].qualified_name, "outer::ns::Foo");
    }

    #[test]
    fn regex_patterns_fullmatch_case_insensitively() {
        let mut idx = SymbolIndexes::new();
        add_class(&mut idx, "WidgetFactory", &[], SymbolKind::Class);
        add_class(&mut idx, "Widget", &[], SymbolKind::Class);

        let filters = SearchFilters::default();
        assert_eq!(search_classes(&idx, "widget", &filters, None).unwrap().total, 1);
        assert_eq!(search_classes(&idx, "Widget.*", &filters, None).unwrap().total, 2);
        assert!(search_classes(&idx, "Widget(", &filters, None).is_err());
    }

    #[test]
    fn namespace_filter_is_exact_and_empty_means_global() {
        let mut idx = SymbolIndexes::new();
        add_class(&mut idx, "app::View", &[], SymbolKind::Class);
        add_class(&mut idx, "View", &[], SymbolKind::Class);

        let mut filters = SearchFilters {
            namespace: Some("app".into()),
            ..Default::default()
        };
        assert_eq!(search_classes(&idx, "", &filters, None).unwrap().total, 1);

        filters.namespace = Some(String::new());
        let global = search_classes(&idx, "", &filters, None).unwrap();
        assert_eq!(global.total, 1);
        assert_eq!(global.symbols[0].qualified_name, "View");
    }

    #[test]
    fn max_results_caps_but_reports_total() {
        let mut idx = SymbolIndexes::new();
        for i in 0..10 {
            add_class(&mut idx, &format!("C{i}"), &[], SymbolKind::Class);
        }
        let filters = SearchFilters {
            max_results: Some(3),
            ..Default::default()
        };
        let outcome = search_classes(&idx, "C\\d", &filters, None).unwrap();
        assert_eq!(outcome.symbols.len(), 3);
        assert_eq!(outcome.total, 10);
    }

    #[test]
    fn derived_classes_direct_and_qualified() {
        let mut idx = SymbolIndexes::new();
        add_class(&mut idx, "Base", &[], SymbolKind::Class);
        add_class(&mut idx, "Child", &["Base"], SymbolKind::Class);
        add_class(&mut idx, "ns::Grand", &["::Base"], SymbolKind::Class);
        add_class(&mut idx, "Stranger", &["Other"], SymbolKind::Class);

        let derived = derived_classes(&idx, "Base", false);
        let names: Vec<_> = derived.iter().map(|s| s.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["Child", "ns::Grand"]);
    }

    #[test]
    fn crtp_prefix_match() {
        let mut idx = SymbolIndexes::new();
        add_class(&mut idx, "Base", &[], SymbolKind::ClassTemplate);
        add_class(&mut idx, "Child", &["Base<Child>"], SymbolKind::Class);

        let derived = derived_classes(&idx, "Base", false);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].qualified_name, "Child");
    }

    #[test]
    fn template_parameter_inheritance_is_followed() {
        let mut idx = SymbolIndexes::new();
        // template<class T, class B> class Mixin : public B {};
        add_class(
            &mut idx,
            "Mixin",
            &["type-parameter-0-1"],
            SymbolKind::ClassTemplate,
        );
        add_class(&mut idx, "Real", &[], SymbolKind::Class);
        add_class(&mut idx, "User", &["Mixin<int, Real>"], SymbolKind::Class);

        let derived = derived_classes(&idx, "Real", false);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].qualified_name, "User");
    }

    #[test]
    fn template_args_split_at_top_level() {
        assert_eq!(
            parse_template_args("int, std::map<int, char>, Foo<Bar<int>>"),
            vec!["int", "std::map<int, char>", "Foo<Bar<int>>"]
        );
    }

    #[test]
    fn hierarchy_marks_cycles() {
        let mut idx = SymbolIndexes::new();
        // Artificial cycle A -> B -> A.
        add_class(&mut idx, "A", &["B"], SymbolKind::Class);
        add_class(&mut idx, "B", &["A"], SymbolKind::Class);

        let hierarchy = class_hierarchy(&idx, "A").unwrap();
        assert_eq!(hierarchy.bases.len(), 1);
        let b = &hierarchy.bases[0];
        assert_eq!(b.name, "B");
        assert!(!b.circular_reference);
        assert_eq!(b.children.len(), 1);
        assert!(b.children[0].circular_reference);
    }

    #[test]
    fn file_name_filter_supports_basename_and_relative() {
        let mut idx = SymbolIndexes::new();
        let mut s = Symbol::new("X", SymbolKind::Class, "c:@S@X", "/proj/src/x.h", 1, 1);
        s.is_definition = true;
        idx.merge(s);

        let mut filters = SearchFilters {
            file_name: Some("x.h".into()),
            ..Default::default()
        };
        let root = Path::new("/proj");
        assert_eq!(search_classes(&idx, "X", &filters, Some(root)).unwrap().total, 1);

        filters.file_name = Some("src/x.h".into());
        assert_eq!(search_classes(&idx, "X", &filters, Some(root)).unwrap().total, 1);

        filters.file_name = Some("other/x.h".into());
        assert_eq!(search_classes(&idx, "X", &filters, Some(root)).unwrap().total, 0);
    }
}
