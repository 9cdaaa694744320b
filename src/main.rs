use anyhow::{Context, Result};
use clap::Parser;
use cppscope::cli::commands::{calls, errors, index, info, search};
use cppscope::cli::{Cli, Commands};
use cppscope::indexing::CppIndexer;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_root = match &cli.project {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    // `init` must work before an index (or even a parseable config) exists.
    if let Commands::Init { force } = &cli.command {
        return index::run_init(&project_root, *force).map_err(anyhow::Error::msg);
    }

    let indexer = CppIndexer::new(&project_root).map_err(|e| {
        let mut message = e.to_string();
        for hint in e.recovery_suggestions() {
            message.push_str(&format!("\n  hint: {hint}"));
        }
        anyhow::anyhow!(message)
    })?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Index { force, deps } => {
            let indexer = Arc::new(indexer);
            spawn_interrupt_watcher(&indexer);
            let worker = indexer.clone();
            let json = cli.json;
            // The pipeline is CPU/IO-bound; keep it off the async reactor.
            tokio::task::spawn_blocking(move || index::run_index(&worker, force, deps, json))
                .await
                .context("indexing task panicked")??;
        }
        Commands::Refresh => {
            let indexer = Arc::new(indexer);
            spawn_interrupt_watcher(&indexer);
            let worker = indexer.clone();
            let json = cli.json;
            tokio::task::spawn_blocking(move || index::run_refresh(&worker, json))
                .await
                .context("refresh task panicked")??;
        }
        Commands::Search(command) => search::run(&indexer, command, cli.json)?,
        Commands::Info(command) => info::run(&indexer, command, cli.json)?,
        Commands::Calls(command) => calls::run(&indexer, command, cli.json)?,
        Commands::Alias { name } => info::run_alias(&indexer, &name, cli.json)?,
        Commands::Errors(command) => errors::run(&indexer, command, cli.json)?,
        Commands::Stats => index::run_stats(&indexer, cli.json),
        Commands::Serve => {
            cppscope::mcp::serve_stdio(indexer)
                .await
                .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;
        }
    }
    Ok(())
}

/// Ctrl-C cancels unscheduled work; in-flight parses finish so the cache
/// stays consistent.
fn spawn_interrupt_watcher(indexer: &Arc<CppIndexer>) {
    let indexer = indexer.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received; finishing in-flight parses...");
            indexer.request_cancel();
        }
    });
}
