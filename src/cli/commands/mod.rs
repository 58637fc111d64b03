//! CLI command handlers: one module per operational subcommand.

pub mod refinery;
pub mod resume;
pub mod run;
pub mod status;
