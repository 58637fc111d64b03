//! `ralph run`: starts a fresh session and drives it to completion or
//! until interrupted.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

use crate::domain::models::SessionStatus;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::LoggerImpl;
use crate::runtime::{self, BuildOptions};

/// Load the config from an explicit path if given, else the default
/// hierarchical search.
pub fn load_config(path: Option<&Path>) -> Result<crate::domain::models::Config> {
    match path {
        Some(p) => ConfigLoader::load_from_file(p).with_context(|| format!("failed to load {}", p.display())),
        None => ConfigLoader::load(),
    }
}

pub async fn handle_run(config_path: Option<&Path>, json_output: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let _logger = LoggerImpl::init(&config.logging)?;

    let repo_root = std::env::current_dir()?.to_string_lossy().to_string();
    let backend = runtime::default_tracker_backend(&config);
    let session = runtime::build(&config, BuildOptions { repo_root, tracker: backend })
        .await
        .context("failed to assemble the coordination core")?;
    session.store.acquire_lock().await.context("failed to acquire session lock")?;

    info!(session_id = %session.session_id, "session started");
    let final_status = drive_to_completion(&session, &config).await;
    session.shutdown(&config, final_status).await;

    let snapshot = session.store.load().await.context("failed to reload final snapshot")?;
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "sessionId": session.session_id,
                "status": format!("{:?}", final_status),
                "snapshot": snapshot,
            }))?
        );
    } else {
        println!("Session {} finished: {final_status:?}", session.session_id);
    }
    Ok(())
}

/// Ticks every second persisting a snapshot, stopping on Ctrl-C, once
/// `maxIterations` is reached, or once the tracker and queue go idle.
/// Shared with `resume`, which continues an existing session the same way.
pub(crate) async fn drive_to_completion(session: &runtime::Session, config: &crate::domain::models::Config) -> SessionStatus {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt signal, stopping session");
                return SessionStatus::Interrupted;
            }
            _ = ticker.tick() => {
                let snapshot = session.persist(config).await;
                if config.max_iterations != 0 && snapshot.iteration >= config.max_iterations {
                    info!(iteration = snapshot.iteration, "reached configured max iterations");
                    return SessionStatus::Completed;
                }
                if session.is_idle().await {
                    info!("no ready tasks, active workers, or queued merges remain");
                    return SessionStatus::Completed;
                }
            }
        }
    }
}
