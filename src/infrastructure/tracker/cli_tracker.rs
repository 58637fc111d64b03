//! External tracker CLI adapter. Shells out to `bd` (task queries/mutations)
//! and `bv` (epic/grouping view), the same direct
//! `tokio::process::Command::new(...)` + parse-stdout-as-JSON approach
//! `infrastructure/git/commands.rs` uses for `git` — neither tool has a
//! native Rust binding in the dependency stack, so every call is a
//! subprocess round trip.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CompleteTaskOutcome, Epic, Task, TaskFilter, TaskStatus};
use crate::domain::ports::Tracker;

/// Binary names for the two tracker CLIs. Defaults match the external
/// tools' conventional names; overridable for tests or alternate installs.
#[derive(Debug, Clone)]
pub struct CliTrackerConfig {
    pub bd_bin: String,
    pub bv_bin: String,
}

impl Default for CliTrackerConfig {
    fn default() -> Self {
        Self {
            bd_bin: "bd".to_string(),
            bv_bin: "bv".to_string(),
        }
    }
}

pub struct CliTracker {
    config: CliTrackerConfig,
}

impl CliTracker {
    pub fn new(config: CliTrackerConfig) -> Self {
        Self { config }
    }

    async fn run_json(&self, bin: &str, args: &[&str]) -> DomainResult<serde_json::Value> {
        debug!(bin, args = ?args, "running tracker CLI command");
        let output = Command::new(bin)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DomainError::TrackerError(format!("failed to spawn {bin} {args:?}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DomainError::TrackerError(format!(
                "{bin} {args:?} failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim()).map_err(|e| {
            DomainError::TrackerError(format!("{bin} {args:?} returned non-JSON output: {e}"))
        })
    }

    fn filter_args(filter: &TaskFilter) -> Vec<String> {
        let mut args = Vec::new();
        for status in &filter.statuses {
            args.push("--status".to_string());
            args.push(status.as_str().to_string());
        }
        if let Some(ready) = filter.ready {
            args.push("--ready".to_string());
            args.push(ready.to_string());
        }
        if let Some(ref needle) = filter.id_substring {
            args.push("--id-contains".to_string());
            args.push(needle.clone());
        }
        if let Some(limit) = filter.limit {
            args.push("--limit".to_string());
            args.push(limit.to_string());
        }
        if let Some(offset) = filter.offset {
            args.push("--offset".to_string());
            args.push(offset.to_string());
        }
        args
    }
}

#[async_trait]
impl Tracker for CliTracker {
    async fn get_tasks(&self, filter: &TaskFilter) -> DomainResult<Vec<Task>> {
        let mut args: Vec<&str> = vec!["list", "--json"];
        let filter_args = Self::filter_args(filter);
        args.extend(filter_args.iter().map(String::as_str));
        let value = self.run_json(&self.config.bd_bin, &args).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_task(&self, id: &str) -> DomainResult<Option<Task>> {
        let value = self
            .run_json(&self.config.bd_bin, &["show", id, "--json"])
            .await;
        match value {
            Ok(v) if v.is_null() => Ok(None),
            Ok(v) => Ok(Some(serde_json::from_value(v)?)),
            Err(DomainError::TrackerError(msg)) if msg.contains("not found") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_next_task(&self, filter: &TaskFilter) -> DomainResult<Option<Task>> {
        let mut args: Vec<&str> = vec!["next", "--json"];
        let filter_args = Self::filter_args(filter);
        args.extend(filter_args.iter().map(String::as_str));
        let value = self.run_json(&self.config.bd_bin, &args).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> DomainResult<Option<Task>> {
        let value = self
            .run_json(
                &self.config.bd_bin,
                &["set-status", id, status.as_str(), "--json"],
            )
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn complete_task(&self, id: &str, reason: Option<&str>) -> DomainResult<CompleteTaskOutcome> {
        let mut args = vec!["complete".to_string(), id.to_string(), "--json".to_string()];
        if let Some(reason) = reason {
            args.push("--reason".to_string());
            args.push(reason.to_string());
        }
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.run_json(&self.config.bd_bin, &args_ref).await {
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(DomainError::TrackerError(msg)) => Ok(CompleteTaskOutcome {
                success: false,
                task: None,
                message: msg.clone(),
                error: Some(msg),
            }),
            Err(e) => Err(e),
        }
    }

    async fn get_epics(&self) -> DomainResult<Vec<Epic>> {
        let value = self.run_json(&self.config.bv_bin, &["epics", "--json"]).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_args_encodes_statuses_and_paging() {
        let filter = TaskFilter {
            statuses: vec![TaskStatus::Open, TaskStatus::InProgress],
            ready: Some(true),
            id_substring: Some("AUTH".to_string()),
            limit: Some(10),
            offset: Some(5),
        };
        let args = CliTracker::filter_args(&filter);
        assert_eq!(
            args,
            vec![
                "--status", "open",
                "--status", "in_progress",
                "--ready", "true",
                "--id-contains", "AUTH",
                "--limit", "10",
                "--offset", "5",
            ]
        );
    }

    #[test]
    fn default_config_uses_conventional_binary_names() {
        let config = CliTrackerConfig::default();
        assert_eq!(config.bd_bin, "bd");
        assert_eq!(config.bv_bin, "bv");
    }

    #[tokio::test]
    async fn get_tasks_surfaces_spawn_failure_as_tracker_error() {
        let tracker = CliTracker::new(CliTrackerConfig {
            bd_bin: "definitely-not-a-real-binary-xyz".to_string(),
            bv_bin: "bv".to_string(),
        });
        let err = tracker.get_tasks(&TaskFilter::default()).await.unwrap_err();
        assert!(matches!(err, DomainError::TrackerError(_)));
    }
}
