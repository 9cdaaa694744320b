//! `calls` subcommand runners.

use crate::cli::args::CallCommands;
use crate::cli::commands::{emit, symbol_line};
use crate::error::IndexResult;
use crate::indexing::CppIndexer;

pub fn run(indexer: &CppIndexer, command: CallCommands, json: bool) -> IndexResult<()> {
    match command {
        CallCommands::Callers { name, class, sites } => {
            let result = indexer.find_callers(&name, class.as_deref(), sites)?;
            emit(json, &result, |r| {
                for caller in &r.callers {
                    println!("{}", symbol_line(caller));
                }
                println!("{} caller(s)", r.callers.len());
                if !r.call_sites.is_empty() {
                    println!("call sites ({}):", r.total_call_sites);
                    for site in &r.call_sites {
                        println!("  {}:{}:{}", site.file, site.line, site.column);
                    }
                }
            });
        }
        CallCommands::Callees { name, class } => {
            let result = indexer.find_callees(&name, class.as_deref())?;
            emit(json, &result, |r| {
                for callee in &r.callees {
                    println!("{}", symbol_line(callee));
                }
                for external in &r.external {
                    println!("{external}  (external)");
                }
                println!("{} callee(s)", r.callees.len() + r.external.len());
            });
        }
        CallCommands::Sites { name, class } => {
            let sites = indexer.get_call_sites(&name, class.as_deref())?;
            emit(json, &sites, |s| {
                for site in s {
                    println!("{}:{}:{}  -> {}", site.file, site.line, site.column, site.callee_usr);
                }
                println!("{} call site(s)", s.len());
            });
        }
        CallCommands::Path {
            from,
            to,
            max_depth,
        } => {
            let paths = indexer.get_call_path(&from, &to, max_depth)?;
            emit(json, &paths, |p| {
                for path in p {
                    println!("{}", path.join(" -> "));
                }
                println!("{} path(s)", p.len());
            });
        }
    }
    Ok(())
}
