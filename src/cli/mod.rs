//! Operational CLI surface: `run`, `resume`, `status`, and
//! `refinery status|list|merge-next`. The terminal UI proper, chat/PRD
//! assistants, and the concrete tracker/agent CLIs stay external
//! collaborators — this module only drives the coordination core.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands, RefineryCommands};
