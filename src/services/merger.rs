//! Merger. Runs the strict pull → check-conflicts → merge → test →
//! push sequence for a single branch, following `merge_queue.rs`'s git
//! plumbing (checkout, `git merge --no-ff`, abort-on-failure, push) but
//! driven through the shared `GitRunner`.

use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use crate::domain::models::MergeOutcome;
use crate::infrastructure::git::GitRunner;

#[derive(Debug, Clone)]
pub struct MergerConfig {
    pub target_branch: String,
    pub run_tests: bool,
    pub test_command: Option<String>,
    pub retry_flaky_tests: u8,
    pub delete_after_merge: bool,
}

pub struct Merger {
    git: GitRunner,
    remote: String,
    config: MergerConfig,
}

impl Merger {
    pub fn new(git: GitRunner, remote: impl Into<String>, config: MergerConfig) -> Self {
        Self {
            git,
            remote: remote.into(),
            config,
        }
    }

    async fn pull_target(&self) -> Result<(), String> {
        self.git.fetch(&self.remote).await.map_err(|e| e.to_string())?;
        self.git.checkout(&self.config.target_branch).await.map_err(|e| e.to_string())?;
        self.git
            .reset_hard(&format!("{}/{}", self.remote, self.config.target_branch))
            .await
            .map_err(|e| e.to_string())
    }

    async fn reset_to_target(&self) {
        let _ = self
            .git
            .reset_hard(&format!("{}/{}", self.remote, self.config.target_branch))
            .await;
    }

    /// Runs the merge sequence for `branch` belonging to `task_id`. Every
    /// failure path resets the target checkout back to `origin/target`
    /// before returning, so a failed attempt never leaves the repo dirty
    /// for the next one.
    pub async fn merge(&self, branch: &str, task_id: &str) -> MergeOutcome {
        if let Err(e) = self.pull_target().await {
            return MergeOutcome::failure(format!("failed to pull target: {e}"));
        }

        let conflicts = match self.git.check_conflicts(&self.config.target_branch, branch).await {
            Ok(files) => files,
            Err(e) => return MergeOutcome::failure(format!("conflict check failed: {e}")),
        };
        if !conflicts.is_empty() {
            return MergeOutcome::conflict(conflicts);
        }

        let message = format!("Merge {branch} ({task_id})");
        match self.git.merge_no_ff(branch, &message).await {
            Ok(out) if out.success => {}
            Ok(out) => {
                self.git.merge_abort().await.ok();
                self.reset_to_target().await;
                return MergeOutcome::failure(out.stderr);
            }
            Err(e) => {
                self.git.merge_abort().await.ok();
                self.reset_to_target().await;
                return MergeOutcome::failure(e.to_string());
            }
        }

        if self.config.run_tests {
            if let Some(ref command) = self.config.test_command {
                let attempts = u32::from(self.config.retry_flaky_tests) + 1;
                let mut passed = false;
                for attempt in 1..=attempts {
                    match run_test_command(command).await {
                        Ok(true) => {
                            passed = true;
                            break;
                        }
                        Ok(false) => {
                            warn!(branch, attempt, attempts, "test command failed");
                        }
                        Err(e) => {
                            warn!(branch, attempt, error = %e, "failed to spawn test command");
                        }
                    }
                }
                if !passed {
                    self.reset_to_target().await;
                    return MergeOutcome::tests_failed();
                }
            }
        }

        match self.git.push(&self.remote, &self.config.target_branch).await {
            Ok(out) if out.success => {}
            Ok(out) => {
                self.reset_to_target().await;
                return MergeOutcome::failure(out.stderr);
            }
            Err(e) => {
                self.reset_to_target().await;
                return MergeOutcome::failure(e.to_string());
            }
        }

        let merge_commit = match self.git.rev_parse_head().await {
            Ok(sha) => sha,
            Err(e) => return MergeOutcome::failure(e.to_string()),
        };

        if self.config.delete_after_merge {
            let _ = self.git.branch_delete(branch, true).await;
            let _ = self.git.push_delete_remote_branch(&self.remote, branch).await;
        }

        info!(branch, %merge_commit, "merge complete");
        MergeOutcome::success(merge_commit)
    }
}

async fn run_test_command(command: &str) -> std::io::Result<bool> {
    let status = tokio::time::timeout(
        Duration::from_secs(600),
        Command::new("sh").arg("-c").arg(command).status(),
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "test command timed out"))??;
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MergerConfig {
        MergerConfig {
            target_branch: "main".to_string(),
            run_tests: true,
            test_command: Some("true".to_string()),
            retry_flaky_tests: 1,
            delete_after_merge: true,
        }
    }

    #[tokio::test]
    async fn passing_test_command_reports_success() {
        assert!(run_test_command("true").await.unwrap());
    }

    #[tokio::test]
    async fn failing_test_command_reports_failure_not_error() {
        assert!(!run_test_command("false").await.unwrap());
    }

    #[test]
    fn merger_config_carries_retry_and_delete_settings() {
        let cfg = config();
        assert_eq!(cfg.retry_flaky_tests, 1);
        assert!(cfg.delete_after_merge);
    }
}
