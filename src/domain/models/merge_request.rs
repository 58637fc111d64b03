//! A queued request to integrate a worker's branch into the target branch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRequestStatus {
    Queued,
    Merging,
    Conflict,
    Merged,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: Uuid,
    pub branch: String,
    pub worker_name: String,
    pub task_id: String,
    /// Inherited from the task; 0 is highest priority.
    pub priority: u8,
    /// Number of tasks this merge would unblock; 0 without a planner.
    pub unblock_count: u32,
    pub created_at: DateTime<Utc>,
    pub status: MergeRequestStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

/// Caller-supplied fields for enqueuing a new merge request.
#[derive(Debug, Clone)]
pub struct MergeRequestInput {
    pub branch: String,
    pub worker_name: String,
    pub task_id: String,
    pub priority: u8,
    pub unblock_count: u32,
}

impl MergeRequest {
    pub fn new(input: MergeRequestInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            branch: input.branch,
            worker_name: input.worker_name,
            task_id: input.task_id,
            priority: input.priority,
            unblock_count: input.unblock_count,
            created_at: Utc::now(),
            status: MergeRequestStatus::Queued,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Priority score — higher dequeues first.
    ///
    /// `(4 - min(priority, 4)) * 1000 + unblock_count * 100 + age_ms * 0.001`
    pub fn priority_score(&self, now: DateTime<Utc>) -> f64 {
        let age_ms = (now - self.created_at).num_milliseconds().max(0) as f64;
        let clamped_priority = f64::from(self.priority.min(4));
        (4.0 - clamped_priority) * 1000.0 + f64::from(self.unblock_count) * 100.0 + age_ms * 0.001
    }
}

/// Outcome of a single merge attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub success: bool,
    pub merge_commit: Option<String>,
    pub conflict: bool,
    pub conflict_files: Vec<String>,
    pub tests_failed: bool,
    pub error: Option<String>,
}

impl MergeOutcome {
    pub fn success(merge_commit: String) -> Self {
        Self {
            success: true,
            merge_commit: Some(merge_commit),
            conflict: false,
            conflict_files: vec![],
            tests_failed: false,
            error: None,
        }
    }

    pub fn conflict(conflict_files: Vec<String>) -> Self {
        Self {
            success: false,
            merge_commit: None,
            conflict: true,
            conflict_files,
            tests_failed: false,
            error: None,
        }
    }

    pub fn tests_failed() -> Self {
        Self {
            success: false,
            merge_commit: None,
            conflict: false,
            conflict_files: vec![],
            tests_failed: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            merge_commit: None,
            conflict: false,
            conflict_files: vec![],
            tests_failed: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request_with(priority: u8, unblock_count: u32, age: Duration) -> MergeRequest {
        let mut mr = MergeRequest::new(MergeRequestInput {
            branch: "work/w1/T1".into(),
            worker_name: "worker1".into(),
            task_id: "T1".into(),
            priority,
            unblock_count,
        });
        mr.created_at = Utc::now() - age;
        mr
    }

    #[test]
    fn priority_dominates_unblock_count_dominates_age() {
        let now = Utc::now();
        let high_priority = request_with(0, 0, Duration::zero());
        let low_priority_many_unblocks = request_with(4, 30, Duration::minutes(1));
        assert!(high_priority.priority_score(now) > low_priority_many_unblocks.priority_score(now));
    }

    #[test]
    fn unblock_count_dominates_age_at_equal_priority() {
        let now = Utc::now();
        let more_unblocks = request_with(2, 5, Duration::zero());
        let older_fewer_unblocks = request_with(2, 1, Duration::seconds(30));
        assert!(more_unblocks.priority_score(now) > older_fewer_unblocks.priority_score(now));
    }
}
