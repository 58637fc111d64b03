//! `ralph resume`: recovers a session left behind by a crashed or killed
//! process, then continues it exactly like `run`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::info;

use crate::cli::commands::run::load_config;
use crate::infrastructure::logging::LoggerImpl;
use crate::runtime::{self, BuildOptions};
use crate::services::session_store::SessionStore;

pub async fn handle_resume(config_path: Option<&Path>, json_output: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let _logger = LoggerImpl::init(&config.logging)?;

    let store = SessionStore::new(config.session.path.clone());
    let Some(_) = store.load().await.context("failed to read existing session file")? else {
        bail!("no session found at {}; use `ralph run` to start one", config.session.path);
    };

    let recovery = store.detect_and_recover().await.context("failed to run crash recovery")?;
    if let Some(summary) = &recovery {
        info!(
            cleared_workers = summary.cleared_workers.len(),
            reset_merges = summary.reset_merges.len(),
            cleared_active_tasks = summary.cleared_active_tasks.len(),
            "recovered session from an unclean shutdown"
        );
    }

    let repo_root = std::env::current_dir()?.to_string_lossy().to_string();
    let backend = runtime::default_tracker_backend(&config);
    let session = runtime::build(&config, BuildOptions { repo_root, tracker: backend })
        .await
        .context("failed to assemble the coordination core")?;
    session.store.acquire_lock().await.context("failed to acquire session lock")?;

    info!(session_id = %session.session_id, "session resumed");
    let final_status = super::run::drive_to_completion(&session, &config).await;
    session.shutdown(&config, final_status).await;

    let snapshot = session.store.load().await.context("failed to reload final snapshot")?;
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "sessionId": session.session_id,
                "status": format!("{:?}", final_status),
                "recovered": recovery,
                "snapshot": snapshot,
            }))?
        );
    } else {
        println!("Session {} finished: {final_status:?}", session.session_id);
    }
    Ok(())
}
