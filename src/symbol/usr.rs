//! Stable symbol identity strings.
//!
//! A USR is an opaque key derived from a symbol's kind, fully qualified name
//! and (for functions) normalized signature. A declaration and its
//! out-of-line definition produce the same USR, which is what the
//! definition-wins merge keys on. The spelling is libclang-flavored but is
//! not part of any public contract.

use crate::types::SymbolKind;
use sha2::{Digest, Sha256};

/// Build the USR for a symbol.
///
/// `detail` disambiguates overloads and specializations: the normalized
/// parameter list for functions, the template-argument spelling for
/// specializations. It is hashed, never embedded verbatim.
pub fn build(kind: SymbolKind, qualified_name: &str, detail: Option<&str>) -> String {
    let tag = match kind {
        SymbolKind::Class | SymbolKind::Struct => "S",
        SymbolKind::ClassTemplate => "ST",
        SymbolKind::PartialSpecialization => "SP",
        SymbolKind::Function | SymbolKind::Method => "F",
        SymbolKind::FunctionTemplate => "FT",
    };
    match detail {
        Some(detail) if !detail.is_empty() => {
            format!("c:@{tag}@{qualified_name}#{}", short_hash(detail))
        }
        _ => format!("c:@{tag}@{qualified_name}"),
    }
}

/// USR recorded for a call target that never resolved against the index
/// (external function, unparsed file). Retained per the call-site contract.
pub fn external(name: &str) -> String {
    format!("c:@F@{name}#ext")
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    // Eight hex chars is plenty for overload sets within one name.
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}

/// Normalize a parameter-list spelling so that declaration and definition
/// agree: collapse whitespace and drop a trailing top-level `const`
/// distinction is kept (const participates in overloading).
pub fn normalize_signature(sig: &str) -> String {
    let mut out = String::with_capacity(sig.len());
    let mut last_space = false;
    for ch in sig.chars() {
        if ch.is_whitespace() {
            if !last_space && !out.is_empty() && !out.ends_with(['(', '<']) {
                out.push(' ');
                last_space = true;
            }
        } else {
            // No space around punctuation that libclang also prints tight.
            if last_space && matches!(ch, ',' | ')' | '>' | '&' | '*') {
                out.pop();
            }
            out.push(ch);
            last_space = false;
        }
    }
    out.trim().to_string()
}
