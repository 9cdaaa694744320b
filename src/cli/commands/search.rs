//! `search` subcommand runners.

use crate::cli::args::SearchCommands;
use crate::cli::commands::{emit, symbol_line};
use crate::error::{IndexError, IndexResult};
use crate::indexing::CppIndexer;
use crate::search::SearchFilters;
use crate::types::SymbolKind;

pub fn run(indexer: &CppIndexer, command: SearchCommands, json: bool) -> IndexResult<()> {
    match command {
        SearchCommands::Classes {
            pattern,
            project_only,
            file,
            namespace,
            limit,
        } => {
            let filters = SearchFilters {
                project_only,
                file_name: file,
                namespace,
                max_results: limit,
                ..Default::default()
            };
            let outcome = indexer.search_classes(&pattern, &filters)?;
            emit(json, &outcome, |o| {
                for symbol in &o.symbols {
                    println!("{}", symbol_line(symbol));
                }
                println!("{} match(es)", o.total);
            });
        }
        SearchCommands::Functions {
            pattern,
            project_only,
            class,
            file,
            namespace,
            limit,
        } => {
            let filters = SearchFilters {
                project_only,
                class_name: class,
                file_name: file,
                namespace,
                max_results: limit,
                ..Default::default()
            };
            let outcome = indexer.search_functions(&pattern, &filters)?;
            emit(json, &outcome, |o| {
                for symbol in &o.symbols {
                    println!("{}", symbol_line(symbol));
                }
                println!("{} match(es)", o.total);
            });
        }
        SearchCommands::Symbols {
            pattern,
            project_only,
            types,
            namespace,
            limit,
        } => {
            let symbol_types = parse_kinds(types)?;
            let filters = SearchFilters {
                project_only,
                symbol_types,
                namespace,
                max_results: limit,
                ..Default::default()
            };
            let result = indexer.search_symbols(&pattern, &filters)?;
            emit(json, &result, |r| {
                println!("Classes ({}):", r.classes.total);
                for symbol in &r.classes.symbols {
                    println!("  {}", symbol_line(symbol));
                }
                println!("Functions ({}):", r.functions.total);
                for symbol in &r.functions.symbols {
                    println!("  {}", symbol_line(symbol));
                }
            });
        }
        SearchCommands::File { path, pattern } => {
            let result = indexer.find_in_file(&path, &pattern)?;
            emit(json, &result, |r| {
                for file in &r.files {
                    println!("{}:", file.file);
                    for symbol in &file.symbols {
                        println!("  {}", symbol_line(symbol));
                    }
                }
                if let Some(message) = &r.message {
                    println!("{message}");
                    for suggestion in &r.suggestions {
                        println!("  suggestion: {suggestion}");
                    }
                }
            });
        }
        SearchCommands::FilesOf {
            name,
            kind,
            project_only,
        } => {
            let kind = match kind {
                Some(k) => Some(SymbolKind::parse(&k).ok_or_else(|| {
                    IndexError::InvalidInput {
                        reason: format!("unknown symbol type '{k}'"),
                    }
                })?),
                None => None,
            };
            let result = indexer.get_files_containing_symbol(&name, kind, project_only)?;
            emit(json, &result, |r| {
                for file in &r.files {
                    println!("{file}");
                }
                println!("{} reference(s) to '{}'", r.total_references, r.symbol);
            });
        }
    }
    Ok(())
}

fn parse_kinds(types: Option<Vec<String>>) -> IndexResult<Option<Vec<SymbolKind>>> {
    let Some(types) = types else {
        return Ok(None);
    };
    let mut kinds = Vec::with_capacity(types.len());
    for t in &types {
        kinds.push(
            SymbolKind::parse(t).ok_or_else(|| IndexError::InvalidInput {
                reason: format!("unknown symbol type '{t}'"),
            })?,
        );
    }
    Ok(Some(kinds))
}
