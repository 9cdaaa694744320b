//! Command runners, one module per command group.

pub mod calls;
pub mod errors;
pub mod index;
pub mod info;
pub mod search;

use crate::symbol::Symbol;
use serde::Serialize;
use std::sync::Arc;

/// Print a result either as pretty JSON or through a text renderer.
pub fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("serialization error: {e}"),
        }
    } else {
        text(value);
    }
}

/// One-line symbol rendering shared by the text output paths.
pub fn symbol_line(symbol: &Arc<Symbol>) -> String {
    let mut line = format!(
        "{:<22} {}  {}",
        symbol.kind.to_string(),
        symbol.qualified_name,
        symbol.location()
    );
    if !symbol.is_definition {
        line.push_str("  (declaration)");
    }
    if let Some(brief) = &symbol.brief {
        line.push_str("\n    ");
        line.push_str(brief);
    }
    line
}
