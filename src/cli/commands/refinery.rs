//! `ralph refinery status|list|merge-next`: standalone refinery
//! operations that don't require an attached `run`/`resume` process.
//! `status`/`list` read the persisted session snapshot directly; since
//! no daemon/IPC channel is in scope, `merge-next` restores the queue
//! from that same snapshot, performs one merge attempt against a fresh
//! `Merger`/`ConflictResolver` pair, and writes the queue back. Without a
//! live dispatcher to hand the resolver a `RebaseExecutor`, a conflict on
//! this path always escalates immediately.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::cli::commands::run::load_config;
use crate::cli::output::TableFormatter;
use crate::domain::models::config::Config;
use crate::infrastructure::git::GitRunner;
use crate::services::conflict_resolver::{ConflictResolver, ConflictResolverConfig};
use crate::services::merge_queue::MergeQueue;
use crate::services::merger::{Merger, MergerConfig};
use crate::services::session_store::SessionStore;
use crate::runtime::DEFAULT_REMOTE;

pub async fn handle_status(config_path: Option<&Path>, json_output: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = SessionStore::new(config.session.path.clone());
    let snapshot = store.load().await.context("failed to read session file")?;

    let Some(snapshot) = snapshot else {
        println!("No session found at {}.", config.session.path);
        return Ok(());
    };
    let pool = snapshot.pool.unwrap_or_default();

    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "queued": pool.merge_queue.iter().filter(|r| r.status == crate::domain::models::MergeRequestStatus::Queued).count(),
                "merging": pool.merge_queue.iter().filter(|r| r.status == crate::domain::models::MergeRequestStatus::Merging).count(),
                "conflict": pool.merge_queue.iter().filter(|r| r.status == crate::domain::models::MergeRequestStatus::Conflict).count(),
                "requests": pool.merge_queue,
            }))?
        );
        return Ok(());
    }

    let formatter = TableFormatter::new();
    println!("{}", formatter.format_merge_requests(&pool.merge_queue));
    Ok(())
}

pub async fn handle_list(config_path: Option<&Path>, json_output: bool) -> Result<()> {
    // `list` and `status` show the same queue; status adds the summary
    // counts, list is the bare table/JSON array.
    let config = load_config(config_path)?;
    let store = SessionStore::new(config.session.path.clone());
    let snapshot = store.load().await.context("failed to read session file")?;
    let pool = snapshot.and_then(|s| s.pool).unwrap_or_default();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&pool.merge_queue)?);
        return Ok(());
    }
    let formatter = TableFormatter::new();
    println!("{}", formatter.format_merge_requests(&pool.merge_queue));
    Ok(())
}

pub async fn handle_merge_next(config_path: Option<&Path>, json_output: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = SessionStore::new(config.session.path.clone());
    let mut snapshot = store
        .load()
        .await
        .context("failed to read session file")?
        .context("no session found; run `ralph run` first")?;
    let mut pool = snapshot.pool.clone().unwrap_or_default();

    let queue = MergeQueue::new();
    queue.restore(pool.merge_queue.clone()).await;

    let Some(request) = queue.dequeue().await else {
        println!("Merge queue is empty.");
        return Ok(());
    };

    let (merger, resolver) = build_standalone_refinery(&config);
    let outcome = merger.merge(&request.branch, &request.task_id).await;

    let result_label = if outcome.success {
        queue
            .update_status(request.id, crate::domain::models::MergeRequestStatus::Merged, None)
            .await
            .ok();
        "merged"
    } else if outcome.conflict {
        queue
            .update_status(
                request.id,
                crate::domain::models::MergeRequestStatus::Conflict,
                outcome.error.clone(),
            )
            .await
            .ok();
        resolver
            .resolve(request.id, &request.branch, outcome.conflict_files.clone(), &queue, None)
            .await;
        "conflict"
    } else {
        queue
            .update_status(
                request.id,
                crate::domain::models::MergeRequestStatus::Failed,
                outcome.error.clone(),
            )
            .await
            .ok();
        "failed"
    };

    pool.merge_queue = queue.list().await;
    snapshot.pool = Some(pool);
    store.save(&snapshot).await.context("failed to persist updated merge queue")?;

    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "branch": request.branch,
                "taskId": request.task_id,
                "result": result_label,
                "mergeCommit": outcome.merge_commit,
                "error": outcome.error,
            }))?
        );
    } else {
        println!("{} ({}): {result_label}", request.branch, request.task_id);
    }
    Ok(())
}

fn build_standalone_refinery(config: &Config) -> (Merger, ConflictResolver) {
    let repo_root = std::env::current_dir().unwrap_or_default().to_string_lossy().to_string();
    let git = GitRunner::new(repo_root);
    let merger = Merger::new(
        git,
        DEFAULT_REMOTE,
        MergerConfig {
            target_branch: config.refinery.target_branch.clone(),
            run_tests: config.refinery.run_tests,
            test_command: config.refinery.test_command.clone(),
            retry_flaky_tests: config.refinery.retry_flaky_tests,
            delete_after_merge: config.refinery.delete_after_merge,
        },
    );
    let resolver = ConflictResolver::new(
        ConflictResolverConfig {
            max_rebase_attempts: config.refinery.max_rebase_attempts,
            default_strategy: config.refinery.on_conflict,
            target_branch: config.refinery.target_branch.clone(),
        },
        None,
    );
    (merger, resolver)
}
