//! `ralph status [--json]`: reports the last persisted session snapshot.
//! Read-only — it never touches a live dispatcher, so it works whether or
//! not a `run`/`resume` process is currently attached to the session file.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::cli::commands::run::load_config;
use crate::cli::output::TableFormatter;
use crate::domain::models::PoolSnapshot;
use crate::services::session_store::SessionStore;

pub async fn handle_status(config_path: Option<&Path>, json_output: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = SessionStore::new(config.session.path.clone());
    let snapshot = store.load().await.context("failed to read session file")?;

    let Some(snapshot) = snapshot else {
        if json_output {
            println!("{}", serde_json::to_string_pretty(&json!({ "session": null }))?);
        } else {
            println!("No session found at {}.", config.session.path);
        }
        return Ok(());
    };

    let locked = store.is_locked_by_live_process().await.unwrap_or(false);

    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "sessionId": snapshot.session_id,
                "status": snapshot.status,
                "mode": snapshot.mode,
                "iteration": snapshot.iteration,
                "maxIterations": snapshot.max_iterations,
                "attached": locked,
                "pool": snapshot.pool,
            }))?
        );
        return Ok(());
    }

    println!(
        "Session {} ({:?}, {})",
        snapshot.session_id,
        snapshot.status,
        if locked { "attached" } else { "detached" }
    );
    println!(
        "Iteration {}{}",
        snapshot.iteration,
        snapshot
            .max_iterations
            .map(|m| format!(" / {m}"))
            .unwrap_or_default()
    );

    let formatter = TableFormatter::new();
    let empty = PoolSnapshot::default();
    let pool = snapshot.pool.as_ref().unwrap_or(&empty);
    let worker_records: Vec<_> = pool
        .workers
        .iter()
        .map(|(name, w)| {
            let mut record = crate::domain::models::WorkerRecord::new(
                name.clone(),
                w.worktree_path.clone(),
                w.branch.clone(),
                w.agent_id.clone(),
            );
            record.task_id = w.task_id.clone();
            record.status = w.status;
            record.iteration = w.iteration;
            record.error = w.error.clone();
            record
        })
        .collect();
    println!("{}", formatter.format_workers(&worker_records));
    println!("{}", formatter.format_merge_requests(&pool.merge_queue));

    Ok(())
}
