//! Infrastructure layer: concrete adapters against the outside world —
//! git subprocesses, agent CLI subprocesses, external trackers,
//! configuration files, and logging. The only layer that does real I/O
//! against external systems; `domain` and `services` stay pure/testable.

pub mod agent;
pub mod config;
pub mod git;
pub mod logging;
pub mod session;
pub mod tracker;
