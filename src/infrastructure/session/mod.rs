//! Session-adjacent file artifacts that aren't the session snapshot
//! itself — currently just the per-iteration transcript log.

pub mod iteration_log;

pub use iteration_log::{IterationLogEntry, IterationLogWriter};
