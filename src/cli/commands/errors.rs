//! `errors` subcommand runners.

use crate::cli::args::ErrorCommands;
use crate::cli::commands::emit;
use crate::error::IndexResult;
use crate::indexing::CppIndexer;

pub fn run(indexer: &CppIndexer, command: ErrorCommands, json: bool) -> IndexResult<()> {
    match command {
        ErrorCommands::List { limit, path } => {
            let errors = indexer.get_parse_errors(limit, path.as_deref())?;
            emit(json, &errors, |list| {
                for record in list {
                    let when = chrono::DateTime::from_timestamp(record.timestamp, 0)
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| record.timestamp.to_string());
                    println!(
                        "[{when}] {} (retry {}): {}",
                        record.path, record.retry_count, record.error
                    );
                }
                println!("{} error(s)", list.len());
            });
        }
        ErrorCommands::Summary => {
            let summary = indexer.get_error_summary()?;
            emit(json, &summary, |s| {
                println!(
                    "{} error(s) across {} file(s)",
                    s.total_errors, s.distinct_files
                );
                if let Some(ts) = s.most_recent {
                    if let Some(when) = chrono::DateTime::from_timestamp(ts, 0) {
                        println!("most recent: {}", when.format("%Y-%m-%d %H:%M:%S"));
                    }
                }
            });
        }
        ErrorCommands::Clear { older_than_days } => {
            let removed = indexer.clear_error_log(older_than_days)?;
            emit(json, &serde_json::json!({ "removed": removed }), |_| {
                println!("Removed {removed} error-log entries.");
            });
        }
    }
    Ok(())
}
