//! ralph — a parallel execution core for an autonomous coding-agent
//! runner. Dispatches ready tasks from a task tracker onto a pool of
//! agent workers, each in its own git working copy, and funnels
//! completed branches through a merge refinery back onto the target
//! branch.
//!
//! - `domain` — pure models, ports, and errors; no I/O.
//! - `services` — the coordination core: scheduler, dispatcher, rate-limit
//!   coordination, and merge refinery.
//! - `infrastructure` — concrete adapters: git subprocesses, agent
//!   subprocesses, trackers, config loading, logging.
//! - `runtime` — assembles the above into one running session.
//! - `cli` — the `run`/`resume`/`status`/`refinery` operational surface.

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod runtime;
pub mod services;
