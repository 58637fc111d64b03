//! Isolated per-worker git working-copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default managed base directory for worker working-copies.
pub const DEFAULT_BASE_DIR: &str = ".ralph-workers";

/// Branch prefix used when naming a worker's working-copy branch.
pub const BRANCH_PREFIX: &str = "work";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingCopy {
    pub name: String,
    pub path: String,
    pub branch: String,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// JSON sidecar metadata written inside a working-copy directory, used to
/// reconcile working copies across process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingCopySidecar {
    pub name: String,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&WorkingCopy> for WorkingCopySidecar {
    fn from(wc: &WorkingCopy) -> Self {
        Self {
            name: wc.name.clone(),
            task_id: wc.task_id.clone(),
            created_at: wc.created_at,
        }
    }
}

pub const SIDECAR_FILENAME: &str = ".ralph-workingcopy.json";

/// Sanitizes a task identifier for safe use as a filesystem/branch path
/// component by substituting path-unsafe characters with `-`.
pub fn sanitize_task_id(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| {
            if "/\\:*?\"<>|".contains(c) {
                '-'
            } else {
                c
            }
        })
        .collect()
}

pub fn branch_name(worker: &str, task_id: &str) -> String {
    format!("{BRANCH_PREFIX}/{worker}/{}", sanitize_task_id(task_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_all_unsafe_characters() {
        let sanitized = sanitize_task_id("a/b\\c:d*e?f\"g<h>i|j");
        assert_eq!(sanitized, "a-b-c-d-e-f-g-h-i-j");
    }

    #[test]
    fn leaves_safe_characters_untouched() {
        assert_eq!(sanitize_task_id("abc-123_DEF.45"), "abc-123_DEF.45");
    }

    #[test]
    fn branch_name_uses_prefix_worker_and_sanitized_task() {
        assert_eq!(branch_name("worker1", "T/1"), "work/worker1/T-1");
    }
}
