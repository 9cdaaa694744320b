//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Persistent C++ code intelligence.
#[derive(Parser)]
#[command(
    name = "cppscope",
    version = env!("CARGO_PKG_VERSION"),
    about = "Index C++ projects and query symbols, call graphs and type aliases",
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Project root to analyze (defaults to the current directory)
    #[arg(short, long, global = true, env = "CPP_ANALYZER_PROJECT_ROOT")]
    pub project: Option<PathBuf>,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write an example .cpp-analyzer-config.json into the project root
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Build or update the index
    Index {
        /// Discard cached state and rebuild from scratch
        #[arg(long)]
        force: bool,
        /// Also index dependency directories
        #[arg(long)]
        deps: bool,
    },

    /// Re-index only changed, added and deleted files
    Refresh,

    /// Search the index
    #[command(subcommand)]
    Search(SearchCommands),

    /// Class structure queries
    #[command(subcommand)]
    Info(InfoCommands),

    /// Call-graph queries
    #[command(subcommand)]
    Calls(CallCommands),

    /// Resolve a type alias to its canonical type
    Alias {
        /// Alias or type name
        name: String,
    },

    /// Parse-error log inspection
    #[command(subcommand)]
    Errors(ErrorCommands),

    /// Index statistics
    Stats,

    /// Serve the query surface over MCP stdio
    Serve,
}

#[derive(Subcommand)]
pub enum SearchCommands {
    /// Classes and structs matching a pattern
    Classes {
        #[arg(default_value = "")]
        pattern: String,
        #[arg(long)]
        project_only: bool,
        /// Basename or path suffix filter
        #[arg(long)]
        file: Option<String>,
        /// Exact namespace; empty string means global
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Functions and methods matching a pattern
    Functions {
        #[arg(default_value = "")]
        pattern: String,
        #[arg(long)]
        project_only: bool,
        /// Restrict to methods of this class
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Classes and functions, partitioned
    Symbols {
        #[arg(default_value = "")]
        pattern: String,
        #[arg(long)]
        project_only: bool,
        /// Kind whitelist (class, struct, function, method, ...)
        #[arg(long, value_delimiter = ',')]
        types: Option<Vec<String>>,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Symbols in files matching a path or glob
    File {
        /// File path or glob
        path: String,
        #[arg(default_value = "")]
        pattern: String,
    },
    /// Files declaring or defining a symbol
    FilesOf {
        name: String,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        project_only: bool,
    },
}

#[derive(Subcommand)]
pub enum InfoCommands {
    /// Class record with methods, members, bases and derived classes
    Class { name: String },
    /// Ancestors and descendants
    Hierarchy { name: String },
    /// Template-aware derived classes of a base
    Derived {
        base: String,
        #[arg(long)]
        project_only: bool,
    },
    /// Human-readable signatures of a function's overloads
    Signature {
        name: String,
        #[arg(long)]
        class: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CallCommands {
    /// Functions calling the named function
    Callers {
        name: String,
        #[arg(long)]
        class: Option<String>,
        /// Include exact call-site locations
        #[arg(long)]
        sites: bool,
    },
    /// Functions the named function calls
    Callees {
        name: String,
        #[arg(long)]
        class: Option<String>,
    },
    /// Outgoing call sites with file/line/column
    Sites {
        name: String,
        #[arg(long)]
        class: Option<String>,
    },
    /// Call paths between two functions
    Path {
        from: String,
        to: String,
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
    },
}

#[derive(Subcommand)]
pub enum ErrorCommands {
    /// Recent parse errors
    List {
        #[arg(long)]
        limit: Option<usize>,
        /// Substring filter on the path
        #[arg(long)]
        path: Option<String>,
    },
    /// Aggregate counts
    Summary,
    /// Delete log entries
    Clear {
        /// Only entries older than this many days
        #[arg(long)]
        older_than_days: Option<u32>,
    },
}
