//! Command-line front end.

pub mod args;
pub mod commands;

pub use args::{CallCommands, Cli, Commands, ErrorCommands, InfoCommands, SearchCommands};
