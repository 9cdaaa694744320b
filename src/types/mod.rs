//! Core enumerations shared across the index.
//!
//! Symbols are plain records with a `kind` discriminant rather than an
//! inheritance hierarchy; fields that do not apply to a kind simply stay at
//! their defaults.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an indexed symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Struct,
    ClassTemplate,
    PartialSpecialization,
    Function,
    Method,
    FunctionTemplate,
}

impl SymbolKind {
    /// True for kinds stored in the class index.
    pub fn is_class_like(self) -> bool {
        matches!(
            self,
            Self::Class | Self::Struct | Self::ClassTemplate | Self::PartialSpecialization
        )
    }

    /// True for kinds stored in the function index.
    pub fn is_function_like(self) -> bool {
        matches!(self, Self::Function | Self::Method | Self::FunctionTemplate)
    }

    /// Parse the wire spelling used in configuration and query filters.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "class" => Some(Self::Class),
            "struct" => Some(Self::Struct),
            "class_template" => Some(Self::ClassTemplate),
            "partial_specialization" => Some(Self::PartialSpecialization),
            "function" => Some(Self::Function),
            "method" => Some(Self::Method),
            "function_template" => Some(Self::FunctionTemplate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Struct => "struct",
            Self::ClassTemplate => "class_template",
            Self::PartialSpecialization => "partial_specialization",
            Self::Function => "function",
            Self::Method => "method",
            Self::FunctionTemplate => "function_template",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a symbol relates to the template machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    ClassTemplate,
    PartialSpecialization,
    FullSpecialization,
    FunctionTemplate,
}

/// Member access level. Free functions report `Public`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[default]
    Public,
    Protected,
    Private,
}

impl Access {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
        }
    }
}

/// Spelling used to introduce a type alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasKind {
    Using,
    Typedef,
}

/// Kind of a template parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateParamKind {
    Type,
    NonType,
    Template,
}

/// One entry of a template parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateParam {
    pub name: String,
    pub kind: TemplateParamKind,
    /// Declared type of a non-type parameter (`int`, `size_t`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

/// Behavior of queries that arrive while indexing is in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPolicy {
    /// Answer from whatever has been merged so far.
    #[default]
    AllowPartial,
    /// Wait until the index pass completes.
    Block,
    /// Fail the query with a policy error.
    Reject,
}

impl QueryPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow_partial" => Some(Self::AllowPartial),
            "block" => Some(Self::Block),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_partition_is_total() {
        let all = [
            SymbolKind::Class,
            SymbolKind::Struct,
            SymbolKind::ClassTemplate,
            SymbolKind::PartialSpecialization,
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::FunctionTemplate,
        ];
        for kind in all {
            assert!(kind.is_class_like() != kind.is_function_like());
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn query_policy_spellings() {
        assert_eq!(QueryPolicy::parse("allow_partial"), Some(QueryPolicy::AllowPartial));
        assert_eq!(QueryPolicy::parse("block"), Some(QueryPolicy::Block));
        assert_eq!(QueryPolicy::parse("reject"), Some(QueryPolicy::Reject));
        assert_eq!(QueryPolicy::parse("no-such"), None);
    }

    #[test]
    fn template_param_serialization_omits_absent_type() {
        let p = TemplateParam {
            name: "T".into(),
            kind: TemplateParamKind::Type,
            r#type: None,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"name":"T","kind":"type"}"#);
    }
}
