//! Crash-safe session persistence document. Versioned so a v1
//! (single-worker) file loads optimistically alongside the v2 parallel
//! shape this runtime writes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::merge_request::MergeRequest;
use super::worker_record::WorkerStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Interrupted,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedWorkerState {
    pub task_id: Option<String>,
    pub iteration: u32,
    pub status: WorkerStatus,
    pub agent_id: String,
    pub worktree_path: String,
    pub branch: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedAgentRateLimit {
    pub limited: bool,
    pub limited_at: Option<DateTime<Utc>>,
    pub retry_after: Option<DateTime<Utc>>,
    pub consecutive_limit_count: u32,
}

/// The `pool` block present only in v2 (parallel) sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub workers: BTreeMap<String, PersistedWorkerState>,
    pub merge_queue: Vec<MergeRequest>,
    pub completed_tasks: BTreeSet<String>,
    pub conflict_tasks: BTreeSet<String>,
    pub rate_limits: BTreeMap<String, PersistedAgentRateLimit>,
    pub max_workers: u32,
    pub fallback_chain: Vec<String>,
    pub active_task_ids: BTreeSet<String>,
}

impl Default for PoolSnapshot {
    fn default() -> Self {
        Self {
            workers: BTreeMap::new(),
            merge_queue: Vec::new(),
            completed_tasks: BTreeSet::new(),
            conflict_tasks: BTreeSet::new(),
            rate_limits: BTreeMap::new(),
            max_workers: 1,
            fallback_chain: Vec::new(),
            active_task_ids: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub session_id: String,
    pub mode: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub iteration: u32,
    pub max_iterations: Option<u32>,
    /// Serialized per-task status, keyed by task id, as last observed from
    /// the tracker; informational only, the tracker remains authoritative.
    pub task_statuses: BTreeMap<String, String>,
    #[serde(default)]
    pub pool: Option<PoolSnapshot>,
}

impl SessionSnapshot {
    pub fn new_v2(session_id: String, mode: String, max_iterations: Option<u32>) -> Self {
        let now = Utc::now();
        Self {
            version: 2,
            session_id,
            mode,
            status: SessionStatus::Running,
            started_at: now,
            updated_at: now,
            iteration: 0,
            max_iterations,
            task_statuses: BTreeMap::new(),
            pool: Some(PoolSnapshot::default()),
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.version >= 2 && self.pool.is_some()
    }

    /// Marks this snapshot as cleanly stopped: on graceful shutdown
    /// `active_task_ids` is emptied and status is no longer `Running`.
    pub fn mark_stopped(&mut self, status: SessionStatus) {
        debug_assert!(status != SessionStatus::Running);
        self.status = status;
        if let Some(pool) = self.pool.as_mut() {
            pool.active_task_ids.clear();
        }
        self.updated_at = Utc::now();
    }

    /// Summary of what a crash-recovery pass cleared, returned to the
    /// caller for a status line.
    pub fn recover(&mut self) -> RecoverySummary {
        let mut summary = RecoverySummary::default();
        self.status = SessionStatus::Interrupted;
        if let Some(pool) = self.pool.as_mut() {
            summary.cleared_active_tasks = pool.active_task_ids.iter().cloned().collect();
            pool.active_task_ids.clear();

            summary.cleared_workers = pool.workers.keys().cloned().collect();
            pool.workers.clear();

            for mr in pool.merge_queue.iter_mut() {
                if mr.status == super::merge_request::MergeRequestStatus::Merging {
                    summary.reset_merges.push(mr.id);
                    mr.status = super::merge_request::MergeRequestStatus::Queued;
                }
            }
        }
        self.updated_at = Utc::now();
        summary
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoverySummary {
    pub cleared_workers: Vec<String>,
    pub reset_merges: Vec<uuid::Uuid>,
    pub cleared_active_tasks: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::merge_request::{MergeRequestInput, MergeRequestStatus};

    #[test]
    fn new_v2_starts_running_with_empty_pool() {
        let snap = SessionSnapshot::new_v2("sess1".into(), "parallel".into(), Some(100));
        assert_eq!(snap.status, SessionStatus::Running);
        assert!(snap.is_parallel());
        assert!(snap.pool.unwrap().active_task_ids.is_empty());
    }

    #[test]
    fn mark_stopped_empties_active_tasks() {
        let mut snap = SessionSnapshot::new_v2("sess1".into(), "parallel".into(), None);
        snap.pool.as_mut().unwrap().active_task_ids.insert("T1".into());
        snap.mark_stopped(SessionStatus::Completed);
        assert_eq!(snap.status, SessionStatus::Completed);
        assert!(snap.pool.unwrap().active_task_ids.is_empty());
    }

    #[test]
    fn recover_resets_merging_requests_to_queued() {
        let mut snap = SessionSnapshot::new_v2("sess1".into(), "parallel".into(), None);
        let mut mr = MergeRequest::new(MergeRequestInput {
            branch: "work/w1/T1".into(),
            worker_name: "w1".into(),
            task_id: "T1".into(),
            priority: 0,
            unblock_count: 0,
        });
        mr.status = MergeRequestStatus::Merging;
        snap.pool.as_mut().unwrap().merge_queue.push(mr);

        let summary = snap.recover();
        assert_eq!(snap.status, SessionStatus::Interrupted);
        assert_eq!(summary.reset_merges.len(), 1);
        assert_eq!(
            snap.pool.unwrap().merge_queue[0].status,
            MergeRequestStatus::Queued
        );
    }
}
