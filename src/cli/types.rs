//! CLI type definitions: a `Commands` subcommand enum plus a global
//! `--json` flag, following the same clap-derive shape as `cli/types.rs`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ralph")]
#[command(about = "Parallel execution core for an autonomous coding-agent runner", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Path to the config file (default: `.ralph/config.yaml`)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a fresh session: dispatch ready tasks, run agents, merge
    /// completed work back into the target branch.
    Run,

    /// Resume a session left behind by a prior run (recovering from a
    /// stale lock if the owning process is gone).
    Resume,

    /// Report the current dispatcher/queue/rate-limit state.
    Status,

    /// Merge refinery inspection and manual control.
    #[command(subcommand)]
    Refinery(RefineryCommands),
}

#[derive(Subcommand)]
pub enum RefineryCommands {
    /// Summary of the refinery: queue depth, in-flight merge, conflicts.
    Status,

    /// List every merge request currently tracked by the queue.
    List,

    /// Force the next queued merge request to be dequeued and attempted.
    MergeNext,
}
