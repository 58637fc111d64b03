//! Task domain model.
//!
//! A task is a unit of work supplied by an external tracker. Tasks form a
//! dependency DAG; a task only becomes eligible for scheduling once every
//! dependency's changes have landed on the target branch (see
//! [`crate::services::scheduler`]).

use serde::{Deserialize, Serialize};

/// Status of a task as reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses a scheduler may still consider dispatchable.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work from the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// 0 is highest priority; 4 is lowest.
    pub priority: u8,
    /// Ordered set of task identifiers this task depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Optional parent/epic identifier.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Whether the tracker itself considers this task's dependencies
    /// satisfied. The scheduler layers a stricter "merged" check on top
    /// of this (see [`TaskFilter`]).
    #[serde(default)]
    pub ready: bool,
}

impl Task {
    pub const MAX_PRIORITY: u8 = 4;

    pub fn clamp_priority(&self) -> u8 {
        self.priority.min(Self::MAX_PRIORITY)
    }
}

/// Filter used when querying the tracker for tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub statuses: Vec<TaskStatus>,
    pub ready: Option<bool>,
    pub id_substring: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl TaskFilter {
    pub fn schedulable() -> Self {
        Self {
            statuses: vec![TaskStatus::Open, TaskStatus::InProgress],
            ready: Some(true),
            ..Default::default()
        }
    }
}

/// Result of asking the tracker to mark a task complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskOutcome {
    pub success: bool,
    pub task: Option<Task>,
    pub message: String,
    pub error: Option<String>,
}

/// An optional grouping of tasks under an epic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    pub id: String,
    pub title: String,
    pub task_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedulable_statuses() {
        assert!(TaskStatus::Open.is_schedulable());
        assert!(TaskStatus::InProgress.is_schedulable());
        assert!(!TaskStatus::Completed.is_schedulable());
        assert!(!TaskStatus::Blocked.is_schedulable());
        assert!(!TaskStatus::Cancelled.is_schedulable());
    }

    #[test]
    fn priority_is_clamped() {
        let task = Task {
            id: "T1".into(),
            title: "t".into(),
            description: String::new(),
            status: TaskStatus::Open,
            priority: 9,
            dependencies: vec![],
            parent_id: None,
            ready: true,
        };
        assert_eq!(task.clamp_priority(), Task::MAX_PRIORITY);
    }

    #[test]
    fn task_status_round_trips_through_json() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaskStatus::InProgress);
    }
}
