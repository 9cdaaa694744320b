//! C++ parsing and symbol extraction.

pub mod cpp;
pub mod includes;

pub use cpp::{CppParser, ExtractionOutput, ParseOutcome, RawCall};
pub use includes::{IncludeDirective, IncludeResolver};

/// Maximum recursion depth for AST traversal, guarding against pathological
/// nesting (large initializers, generated code).
pub const MAX_AST_DEPTH: usize = 500;

/// Maximum length of the `brief` documentation field.
pub const MAX_BRIEF_LEN: usize = 200;

/// Maximum length of the `doc_comment` field, ellipsis included.
pub const MAX_DOC_LEN: usize = 4000;

/// Truncate at a UTF-8 character boundary at or before `max_bytes`.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    &s[..boundary]
}

/// Truncate to `max_bytes`, appending `...` when something was dropped.
pub fn truncate_with_ellipsis(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let kept = safe_truncate(s, max_bytes.saturating_sub(3));
    format!("{kept}...")
}

/// Collapse runs of whitespace into single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !in_space && !out.is_empty() {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let text = "Status: 🔍 Active";
        let result = safe_truncate(text, 10);
        assert!(result.len() <= 10);
        assert_eq!(result, "Status: ");
    }

    #[test]
    fn ellipsis_only_when_truncated() {
        assert_eq!(truncate_with_ellipsis("short", 100), "short");
        let long = "x".repeat(50);
        let cut = truncate_with_ellipsis(&long, 10);
        assert_eq!(cut.len(), 10);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn whitespace_collapse() {
        assert_eq!(collapse_whitespace("a   b\n\t c "), "a b c");
        assert_eq!(collapse_whitespace("  lead"), "lead");
    }
}
