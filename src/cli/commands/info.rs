//! `info` and `alias` subcommand runners.

use crate::cli::args::InfoCommands;
use crate::cli::commands::{emit, symbol_line};
use crate::error::IndexResult;
use crate::indexing::CppIndexer;
use crate::indexing::indexer::TypeAliasInfo;
use crate::search::HierarchyNode;

pub fn run(indexer: &CppIndexer, command: InfoCommands, json: bool) -> IndexResult<()> {
    match command {
        InfoCommands::Class { name } => {
            let info = indexer.get_class_info(&name)?;
            emit(json, &info, |i| {
                println!("{}", symbol_line(&i.class));
                if !i.class.base_classes.is_empty() {
                    println!("  bases: {}", i.class.base_classes.join(", "));
                }
                if !i.class.members.is_empty() {
                    println!("  members:");
                    for member in &i.class.members {
                        println!("    {member}");
                    }
                }
                if !i.methods.is_empty() {
                    println!("  methods:");
                    for method in &i.methods {
                        println!("    {}", method.human_signature());
                    }
                }
                if !i.derived_classes.is_empty() {
                    println!("  derived: {}", i.derived_classes.join(", "));
                }
                if let Some(doc) = &i.class.doc_comment {
                    println!("  doc:\n{doc}");
                }
            });
        }
        InfoCommands::Hierarchy { name } => {
            let hierarchy = indexer.get_class_hierarchy(&name)?;
            emit(json, &hierarchy, |h| {
                println!("{}", h.class.qualified_name);
                println!("ancestors:");
                print_nodes(&h.bases, 1);
                println!("descendants:");
                print_nodes(&h.derived, 1);
            });
        }
        InfoCommands::Derived { base, project_only } => {
            let derived = indexer.get_derived_classes(&base, project_only)?;
            emit(json, &derived, |d| {
                for symbol in d {
                    println!("{}", symbol_line(symbol));
                }
                println!("{} derived class(es)", d.len());
            });
        }
        InfoCommands::Signature { name, class } => {
            let signatures = indexer.get_function_signature(&name, class.as_deref())?;
            emit(json, &signatures, |s| {
                for signature in s {
                    println!("{signature}");
                }
            });
        }
    }
    Ok(())
}

pub fn run_alias(indexer: &CppIndexer, name: &str, json: bool) -> IndexResult<()> {
    let info = indexer.get_type_alias_info(name)?;
    emit(json, &info, |i| match i {
        TypeAliasInfo::NotFound { name } => println!("'{name}' does not resolve to an indexed type."),
        TypeAliasInfo::Ambiguous { name, candidates } => {
            println!("'{name}' is ambiguous:");
            for candidate in candidates {
                println!("  {candidate}");
            }
        }
        TypeAliasInfo::Resolved {
            canonical_type,
            file,
            line,
            aliases,
            ..
        } => {
            println!("canonical: {canonical_type} ({file}:{line})");
            for alias in aliases {
                println!(
                    "  {} {} = {}  ({}:{})",
                    match alias.alias_kind {
                        crate::types::AliasKind::Using => "using",
                        crate::types::AliasKind::Typedef => "typedef",
                    },
                    alias.qualified_name,
                    alias.target_type,
                    alias.file,
                    alias.line
                );
            }
        }
    });
    Ok(())
}

fn print_nodes(nodes: &[HierarchyNode], depth: usize) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        if node.circular_reference {
            println!("{indent}{} (circular reference)", node.name);
        } else {
            println!("{indent}{}", node.name);
        }
        print_nodes(&node.children, depth + 1);
    }
}
