//! Thin git plumbing shared by the working-copy manager and the merger.
//! Grounded on `services/worktree_service.rs` and `services/merge_queue.rs`'s
//! direct `tokio::process::Command::new("git")` usage — this crate has no
//! `git2`/`gix` binding in its dependency stack.

pub mod commands;

pub use commands::GitRunner;
