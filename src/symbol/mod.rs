//! The symbol record and its merge rules.

pub mod usr;

use crate::types::{Access, SymbolKind, TemplateKind, TemplateParam};
use serde::{Deserialize, Serialize};

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_empty_vec<T>(v: &Vec<T>) -> bool {
    v.is_empty()
}

/// A named C++ entity surfaced by the index.
///
/// One record per declaration or definition site; the definition-wins merge
/// keeps at most one record per USR in the name and USR indexes, while a
/// header's declaration record stays visible through the file index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    /// Fully qualified, `::`-separated. Anonymous namespaces appear as the
    /// literal token `(anonymous namespace)`.
    pub qualified_name: String,
    /// Everything left of the last `::` segment, including enclosing classes.
    /// Empty for the global namespace.
    #[serde(default)]
    pub namespace: String,
    pub kind: SymbolKind,
    /// Stable opaque identity; see [`usr`].
    pub usr: String,

    /// Primary location: where the symbol textually appears (the declaration
    /// site if declared in a header).
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub start_line: u32,
    pub end_line: u32,

    /// When declaration and definition live in different files, these mirror
    /// the *other* location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_end_line: Option<u32>,

    pub is_definition: bool,
    pub is_project: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Simple name of the enclosing class for methods.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_class: String,
    /// Canonical spellings of base classes, template arguments qualified.
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub base_classes: Vec<String>,
    /// Data members of a class definition, as `type name` spellings.
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub members: Vec<String>,
    #[serde(default)]
    pub access: Access,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_virtual: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_pure_virtual: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_const: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_static: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_template: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_kind: Option<TemplateKind>,
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub template_parameters: Vec<TemplateParam>,
    /// Links a specialization back to its primary template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_template_usr: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_template_specialization: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
}

impl Symbol {
    /// Minimal record; the extractor fills the rest in place.
    pub fn new(
        name: impl Into<String>,
        kind: SymbolKind,
        usr: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        column: u32,
    ) -> Self {
        let name = name.into();
        Self {
            qualified_name: name.clone(),
            name,
            namespace: String::new(),
            kind,
            usr: usr.into(),
            file: file.into(),
            line,
            column,
            start_line: line,
            end_line: line,
            header_file: None,
            header_line: None,
            header_start_line: None,
            header_end_line: None,
            is_definition: false,
            is_project: false,
            signature: None,
            parent_class: String::new(),
            base_classes: Vec::new(),
            members: Vec::new(),
            access: Access::Public,
            is_virtual: false,
            is_pure_virtual: false,
            is_const: false,
            is_static: false,
            is_template: false,
            template_kind: None,
            template_parameters: Vec::new(),
            primary_template_usr: None,
            is_template_specialization: false,
            brief: None,
            doc_comment: None,
        }
    }

    /// `file:line` for display.
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }

    /// Human-readable signature, e.g. `void ns::Widget::draw(int) const`.
    pub fn human_signature(&self) -> String {
        let sig = self.signature.as_deref().unwrap_or("");
        // Stored signatures have the shape "ret (params)"; splice the
        // qualified name in front of the parameter list.
        let mut out = String::new();
        if self.is_virtual {
            out.push_str("virtual ");
        }
        if self.is_static {
            out.push_str("static ");
        }
        if let Some(open) = sig.find('(') {
            let (ret, params) = sig.split_at(open);
            out.push_str(ret.trim_end());
            if !ret.trim_end().is_empty() {
                out.push(' ');
            }
            out.push_str(&self.qualified_name);
            out.push_str(params);
        } else {
            out.push_str(&self.qualified_name);
            if !sig.is_empty() {
                out.push_str(": ");
                out.push_str(sig);
            }
        }
        if self.is_const {
            out.push_str(" const");
        }
        if self.is_pure_virtual {
            out.push_str(" = 0");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_symbol_defaults() {
        let s = Symbol::new("Widget", SymbolKind::Class, "c:@S@Widget", "w.h", 3, 7);
        assert_eq!(s.qualified_name, "Widget");
        assert_eq!(s.start_line, 3);
        assert_eq!(s.end_line, 3);
        assert!(!s.is_definition);
        assert_eq!(s.access, Access::Public);
    }

    #[test]
    fn human_signature_splices_qualified_name() {
        let mut s = Symbol::new(
            "draw",
            SymbolKind::Method,
            "c:@F@draw#",
            "w.h",
            10,
            5,
        );
        s.qualified_name = "ns::Widget::draw".into();
        s.signature = Some("void (int)".into());
        s.is_const = true;
        s.is_virtual = true;
        assert_eq!(s.human_signature(), "virtual void ns::Widget::draw(int) const");
    }

    #[test]
    fn serialization_skips_defaults() {
        let s = Symbol::new("f", SymbolKind::Function, "c:@F@f#", "a.cpp", 1, 1);
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("is_virtual"));
        assert!(!json.contains("header_file"));
        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
