//! Per-iteration transcript files: one human-readable `.log` per agent
//! invocation, written under `{outputDir}/iterations/`. Mirrors the
//! teacher's `infrastructure::logging::rotation` module in spirit — both
//! own a family of files named by a counter under a managed directory —
//! though there's no rotation or retention here, each iteration gets its
//! own file forever.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::working_copy::sanitize_task_id;
use crate::domain::models::IterationStatus;

const DESCRIPTION_TRUNCATE_LEN: usize = 200;

/// Everything needed to render one iteration's header and body.
pub struct IterationLogEntry {
    pub iteration: u32,
    pub task_id: String,
    pub title: String,
    pub description: String,
    pub epic: Option<String>,
    pub status: IterationStatus,
    pub task_completed: bool,
    pub promise_detected: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub agent: String,
    pub model: Option<String>,
    pub stdout: String,
    pub stderr: Option<String>,
}

fn status_label(status: IterationStatus) -> &'static str {
    match status {
        IterationStatus::Completed => "completed",
        IterationStatus::TaskCompleted => "task_completed",
        IterationStatus::Failed => "failed",
        IterationStatus::RateLimited => "rate_limited",
        IterationStatus::Interrupted => "interrupted",
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn truncate_description(description: &str) -> String {
    if description.chars().count() <= DESCRIPTION_TRUNCATE_LEN {
        return description.to_string();
    }
    let truncated: String = description.chars().take(DESCRIPTION_TRUNCATE_LEN).collect();
    format!("{truncated}…")
}

fn optional_field(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

impl IterationLogEntry {
    fn file_name(&self) -> String {
        format!(
            "iteration-{:03}-{}.log",
            self.iteration,
            sanitize_task_id(&self.task_id)
        )
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("- **Iteration**: {}\n", self.iteration));
        out.push_str(&format!("- **Task ID**: {}\n", self.task_id));
        out.push_str(&format!("- **Title**: {}\n", self.title));
        out.push_str(&format!("- **Description**: {}\n", truncate_description(&self.description)));
        out.push_str(&format!("- **Status**: {}\n", status_label(self.status)));
        out.push_str(&format!("- **Task Completed**: {}\n", yes_no(self.task_completed)));
        out.push_str(&format!("- **Promise Detected**: {}\n", yes_no(self.promise_detected)));
        out.push_str(&format!("- **Started**: {}\n", self.started_at.to_rfc3339()));
        out.push_str(&format!("- **Ended**: {}\n", self.ended_at.to_rfc3339()));
        out.push_str(&format!("- **Duration**: {}ms\n", self.duration_ms));
        out.push_str(&format!("- **Error**: {}\n", optional_field(self.error.as_deref())));
        out.push_str(&format!("- **Agent**: {}\n", self.agent));
        out.push_str(&format!("- **Model**: {}\n", optional_field(self.model.as_deref())));
        out.push_str(&format!("- **Epic**: {}\n", optional_field(self.epic.as_deref())));

        out.push_str("\n--- RAW OUTPUT ---\n");
        out.push_str(&self.stdout);

        if let Some(stderr) = self.stderr.as_deref().filter(|s| !s.is_empty()) {
            out.push_str("\n--- STDERR ---\n");
            out.push_str(stderr);
        }

        out
    }
}

/// Writes one transcript file per iteration under a managed directory.
pub struct IterationLogWriter {
    dir: PathBuf,
}

impl IterationLogWriter {
    /// `output_dir` is the configured top-level output directory
    /// (`.ralph-tui` by default); iterations live in its `iterations`
    /// subdirectory.
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: output_dir.as_ref().join("iterations"),
        }
    }

    pub async fn write(&self, entry: &IterationLogEntry) -> DomainResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DomainError::GitError(format!("failed to create iteration log dir: {e}")))?;

        let path = self.dir.join(entry.file_name());
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| DomainError::GitError(format!("failed to create {}: {e}", path.display())))?;
        file.write_all(entry.render().as_bytes())
            .await
            .map_err(|e| DomainError::GitError(format!("failed to write {}: {e}", path.display())))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> IterationLogEntry {
        IterationLogEntry {
            iteration: 3,
            task_id: "T-42".into(),
            title: "Fix the thing".into(),
            description: "short description".into(),
            epic: None,
            status: IterationStatus::TaskCompleted,
            task_completed: true,
            promise_detected: true,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            duration_ms: 1500,
            error: None,
            agent: "claude".into(),
            model: Some("sonnet".into()),
            stdout: "did the work\n".into(),
            stderr: None,
        }
    }

    #[test]
    fn file_name_zero_pads_iteration_and_sanitizes_task_id() {
        let mut entry = sample_entry();
        entry.task_id = "feat/42".into();
        assert_eq!(entry.file_name(), "iteration-003-feat-42.log");
    }

    #[test]
    fn render_includes_dividers_and_header_fields() {
        let entry = sample_entry();
        let rendered = entry.render();
        assert!(rendered.contains("- **Task ID**: T-42"));
        assert!(rendered.contains("- **Promise Detected**: Yes"));
        assert!(rendered.contains("\n--- RAW OUTPUT ---\ndid the work"));
        assert!(!rendered.contains("--- STDERR ---"));
    }

    #[test]
    fn render_appends_stderr_divider_only_when_nonempty() {
        let mut entry = sample_entry();
        entry.stderr = Some("boom".into());
        let rendered = entry.render();
        assert!(rendered.contains("\n--- STDERR ---\nboom"));
    }

    #[test]
    fn description_longer_than_200_chars_is_truncated_with_ellipsis() {
        let mut entry = sample_entry();
        entry.description = "x".repeat(250);
        let rendered = entry.render();
        let expected = format!("- **Description**: {}…\n", "x".repeat(200));
        assert!(rendered.contains(&expected));
    }

    #[tokio::test]
    async fn write_creates_iterations_subdirectory_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = IterationLogWriter::new(tmp.path());
        let entry = sample_entry();
        let path = writer.write(&entry).await.unwrap();
        assert!(path.starts_with(tmp.path().join("iterations")));
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("--- RAW OUTPUT ---"));
    }
}
