//! Command-line surface: argument parsing and the run handler.

pub mod arg_parser;
pub mod handlers;

pub use arg_parser::Cli;
pub use handlers::{apply_cli_overrides, handle_run};
