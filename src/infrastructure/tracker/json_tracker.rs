//! File-backed `Tracker`. Keeps the whole task list and epic list in a
//! single JSON document and rewrites it atomically on every mutation,
//! following `services/session_store.rs`'s write-beside-then-rename
//! convention rather than a database.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CompleteTaskOutcome, Epic, Task, TaskFilter, TaskStatus};
use crate::domain::ports::Tracker;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TrackerDocument {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    epics: Vec<Epic>,
}

/// A `Tracker` backed by a single JSON file. Intended for local/solo use
/// where no issue-tracker CLI is available; the whole document is read
/// and rewritten on each call, which is fine at the task counts this
/// runner targets.
pub struct JsonTracker {
    path: PathBuf,
    // Serializes read-modify-write cycles so two concurrent mutations
    // (e.g. two workers completing tasks at once) don't race on the
    // same file.
    lock: Mutex<()>,
}

impl JsonTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_document(&self) -> DomainResult<TrackerDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TrackerDocument::default()),
            Err(e) => Err(DomainError::TrackerError(format!(
                "failed to read tracker file {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write_document(&self, doc: &TrackerDocument) -> DomainResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DomainError::TrackerError(format!("failed to create tracker dir: {e}"))
            })?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| DomainError::TrackerError(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            DomainError::TrackerError(format!("failed to rename tracker file into place: {e}"))
        })?;
        Ok(())
    }

    fn matches(task: &Task, filter: &TaskFilter) -> bool {
        if !filter.statuses.is_empty() && !filter.statuses.contains(&task.status) {
            return false;
        }
        if let Some(ready) = filter.ready {
            if task.ready != ready {
                return false;
            }
        }
        if let Some(ref needle) = filter.id_substring {
            if !task.id.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }

    fn apply_filter(tasks: Vec<Task>, filter: &TaskFilter) -> Vec<Task> {
        let mut matched: Vec<Task> = tasks.into_iter().filter(|t| Self::matches(t, filter)).collect();
        matched.sort_by_key(|t| t.clamp_priority());
        let offset = filter.offset.unwrap_or(0);
        if offset >= matched.len() {
            return Vec::new();
        }
        let mut rest = matched.split_off(offset);
        if let Some(limit) = filter.limit {
            rest.truncate(limit);
        }
        rest
    }
}

#[async_trait]
impl Tracker for JsonTracker {
    async fn get_tasks(&self, filter: &TaskFilter) -> DomainResult<Vec<Task>> {
        let doc = self.read_document().await?;
        Ok(Self::apply_filter(doc.tasks, filter))
    }

    async fn get_task(&self, id: &str) -> DomainResult<Option<Task>> {
        let doc = self.read_document().await?;
        Ok(doc.tasks.into_iter().find(|t| t.id == id))
    }

    async fn get_next_task(&self, filter: &TaskFilter) -> DomainResult<Option<Task>> {
        let doc = self.read_document().await?;
        Ok(Self::apply_filter(doc.tasks, filter).into_iter().next())
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> DomainResult<Option<Task>> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        let Some(task) = doc.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        task.status = status;
        let updated = task.clone();
        self.write_document(&doc).await?;
        Ok(Some(updated))
    }

    async fn complete_task(&self, id: &str, reason: Option<&str>) -> DomainResult<CompleteTaskOutcome> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        let Some(task) = doc.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(CompleteTaskOutcome {
                success: false,
                task: None,
                message: format!("no such task: {id}"),
                error: Some("not_found".to_string()),
            });
        };
        task.status = TaskStatus::Completed;
        let completed = task.clone();
        self.write_document(&doc).await?;
        Ok(CompleteTaskOutcome {
            success: true,
            task: Some(completed),
            message: reason.unwrap_or("completed").to_string(),
            error: None,
        })
    }

    async fn get_epics(&self) -> DomainResult<Vec<Epic>> {
        Ok(self.read_document().await?.epics)
    }
}

impl JsonTracker {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_task(id: &str, status: TaskStatus, ready: bool, priority: u8) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            description: String::new(),
            status,
            priority,
            dependencies: Vec::new(),
            parent_id: None,
            ready,
        }
    }

    #[tokio::test]
    async fn returns_empty_when_file_does_not_exist() {
        let dir = tempdir().unwrap();
        let tracker = JsonTracker::new(dir.path().join("tracker.json"));
        let tasks = tracker.get_tasks(&TaskFilter::default()).await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn filters_and_orders_by_priority() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        let doc = TrackerDocument {
            tasks: vec![
                sample_task("a", TaskStatus::Open, true, 2),
                sample_task("b", TaskStatus::Open, true, 0),
                sample_task("c", TaskStatus::Blocked, true, 0),
            ],
            epics: Vec::new(),
        };
        tokio::fs::write(&path, serde_json::to_string(&doc).unwrap()).await.unwrap();

        let tracker = JsonTracker::new(&path);
        let tasks = tracker.get_tasks(&TaskFilter::schedulable()).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "b");
        assert_eq!(tasks[1].id, "a");
    }

    #[tokio::test]
    async fn complete_task_persists_status_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        let doc = TrackerDocument {
            tasks: vec![sample_task("a", TaskStatus::InProgress, true, 1)],
            epics: Vec::new(),
        };
        tokio::fs::write(&path, serde_json::to_string(&doc).unwrap()).await.unwrap();

        let tracker = JsonTracker::new(&path);
        let outcome = tracker.complete_task("a", Some("done")).await.unwrap();
        assert!(outcome.success);

        let reloaded = tracker.get_task("a").await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn complete_task_reports_failure_for_unknown_id() {
        let dir = tempdir().unwrap();
        let tracker = JsonTracker::new(dir.path().join("tracker.json"));
        let outcome = tracker.complete_task("missing", None).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.task.is_none());
    }
}
