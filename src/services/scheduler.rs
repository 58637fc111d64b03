//! Scheduler. Computes the ready-task frontier against a tracker
//! capability and a locally-owned `mergedSet`, and arbitrates task→worker
//! assignment. Grounded on `services/dependency_resolver.rs`'s
//! dependency-gating style and `services/priority_calculator.rs`'s
//! ascending-priority sort, adapted onto the `Tracker` port.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Assignment, MergedSet, Task, TaskFilter, TaskStatus};
use crate::domain::ports::Tracker;

/// A planner-provided parallel track. Tracks group tasks that can proceed
/// independently; `number` 0 is the default track used when no planner is
/// wired in.
#[derive(Debug, Clone)]
pub struct Track {
    pub number: u32,
    pub task_ids: Vec<String>,
}

pub struct SchedulerConfig {
    pub max_workers: u32,
    pub strict_dependencies: bool,
}

pub struct Scheduler {
    tracker: std::sync::Arc<dyn Tracker>,
    config: SchedulerConfig,
    merged_set: MergedSet,
    assigned: HashMap<String, String>,
    tracks: Vec<Track>,
}

impl Scheduler {
    pub fn new(tracker: std::sync::Arc<dyn Tracker>, config: SchedulerConfig) -> Self {
        Self {
            tracker,
            config,
            merged_set: MergedSet::new(),
            assigned: HashMap::new(),
            tracks: Vec::new(),
        }
    }

    fn track_of(&self, task_id: &str) -> u32 {
        self.tracks
            .iter()
            .find(|t| t.task_ids.iter().any(|id| id == task_id))
            .map_or(0, |t| t.number)
    }

    /// Candidate tasks ready to run: tracker-ready, not already assigned,
    /// and (if `strictDependencies`) with every dependency already merged.
    /// Sorted by ascending priority, ties preserved in tracker order.
    pub async fn get_ready_tasks(&self) -> DomainResult<Vec<Assignment>> {
        let tasks = self
            .tracker
            .get_tasks(&TaskFilter::schedulable())
            .await?;

        let mut candidates: Vec<Task> = tasks
            .into_iter()
            .filter(|t| matches!(t.status, TaskStatus::Open | TaskStatus::InProgress))
            .filter(|t| t.ready)
            .filter(|t| !self.assigned.contains_key(&t.id))
            .collect();

        if self.config.strict_dependencies {
            candidates.retain(|t| t.dependencies.iter().all(|dep| self.merged_set.contains(dep)));
        }

        candidates.sort_by_key(|t| t.priority);

        Ok(candidates
            .into_iter()
            .map(|t| Assignment {
                track: self.track_of(&t.id),
                dependencies: t.dependencies.clone(),
                task_id: t.id,
                worker_name: String::new(),
            })
            .collect())
    }

    pub fn assign_task(&mut self, task_id: &str, worker: &str) -> DomainResult<()> {
        if self.assigned.contains_key(task_id) {
            return Err(DomainError::AlreadyAssigned(task_id.to_string()));
        }
        self.assigned.insert(task_id.to_string(), worker.to_string());
        Ok(())
    }

    pub fn unassign_task(&mut self, task_id: &str) {
        self.assigned.remove(task_id);
    }

    pub fn mark_merged(&mut self, task_id: &str) {
        self.merged_set.insert(task_id.to_string());
        self.assigned.remove(task_id);
    }

    pub fn is_merged(&self, task_id: &str) -> bool {
        self.merged_set.contains(task_id)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Consults the (currently absent) planner tool to refresh the track
    /// cache. Failures are non-fatal; the cache is left untouched so a
    /// transient planner outage doesn't stall scheduling.
    pub async fn refresh_tracks(&mut self) {
        debug!("no planner tool wired in; leaving track cache as-is");
    }

    pub fn can_assign_more(&self) -> bool {
        (self.assigned.len() as u32) < self.config.max_workers
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_assigned(&self, task_id: &str) -> bool {
        self.assigned.contains_key(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    use crate::domain::models::CompleteTaskOutcome;
    use crate::domain::models::Epic;

    struct FakeTracker {
        tasks: Mutex<Vec<Task>>,
    }

    #[async_trait]
    impl Tracker for FakeTracker {
        async fn get_tasks(&self, _filter: &TaskFilter) -> DomainResult<Vec<Task>> {
            Ok(self.tasks.lock().await.clone())
        }

        async fn get_task(&self, id: &str) -> DomainResult<Option<Task>> {
            Ok(self.tasks.lock().await.iter().find(|t| t.id == id).cloned())
        }

        async fn get_next_task(&self, _filter: &TaskFilter) -> DomainResult<Option<Task>> {
            Ok(None)
        }

        async fn update_task_status(
            &self,
            _id: &str,
            _status: TaskStatus,
        ) -> DomainResult<Option<Task>> {
            Ok(None)
        }

        async fn complete_task(&self, _id: &str, _reason: Option<&str>) -> DomainResult<CompleteTaskOutcome> {
            Ok(CompleteTaskOutcome {
                success: true,
                task: None,
                message: String::new(),
                error: None,
            })
        }

        async fn get_epics(&self) -> DomainResult<Vec<Epic>> {
            Ok(Vec::new())
        }
    }

    fn task(id: &str, priority: u8, deps: &[&str], ready: bool) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            status: TaskStatus::Open,
            priority,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            parent_id: None,
            ready,
        }
    }

    #[tokio::test]
    async fn ready_tasks_are_sorted_by_ascending_priority() {
        let tracker = Arc::new(FakeTracker {
            tasks: Mutex::new(vec![task("b", 2, &[], true), task("a", 0, &[], true)]),
        });
        let scheduler = Scheduler::new(
            tracker,
            SchedulerConfig {
                max_workers: 4,
                strict_dependencies: true,
            },
        );
        let ready = scheduler.get_ready_tasks().await.unwrap();
        assert_eq!(ready[0].task_id, "a");
        assert_eq!(ready[1].task_id, "b");
    }

    #[tokio::test]
    async fn strict_dependencies_gate_on_merged_set() {
        let tracker = Arc::new(FakeTracker {
            tasks: Mutex::new(vec![task("a", 0, &["dep"], true)]),
        });
        let scheduler = Scheduler::new(
            tracker,
            SchedulerConfig {
                max_workers: 4,
                strict_dependencies: true,
            },
        );
        let ready = scheduler.get_ready_tasks().await.unwrap();
        assert!(ready.is_empty());
    }

    #[tokio::test]
    async fn assign_task_rejects_double_assignment() {
        let tracker = Arc::new(FakeTracker {
            tasks: Mutex::new(Vec::new()),
        });
        let mut scheduler = Scheduler::new(
            tracker,
            SchedulerConfig {
                max_workers: 4,
                strict_dependencies: true,
            },
        );
        scheduler.assign_task("a", "worker1").unwrap();
        let err = scheduler.assign_task("a", "worker2").unwrap_err();
        assert!(matches!(err, DomainError::AlreadyAssigned(_)));
    }

    #[tokio::test]
    async fn mark_merged_unblocks_dependents() {
        let tracker = Arc::new(FakeTracker {
            tasks: Mutex::new(vec![task("a", 0, &["dep"], true)]),
        });
        let mut scheduler = Scheduler::new(
            tracker,
            SchedulerConfig {
                max_workers: 4,
                strict_dependencies: true,
            },
        );
        assert!(scheduler.get_ready_tasks().await.unwrap().is_empty());
        scheduler.mark_merged("dep");
        assert!(!scheduler.get_ready_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn can_assign_more_respects_max_workers() {
        let tracker = Arc::new(FakeTracker {
            tasks: Mutex::new(Vec::new()),
        });
        let mut scheduler = Scheduler::new(
            tracker,
            SchedulerConfig {
                max_workers: 1,
                strict_dependencies: true,
            },
        );
        assert!(scheduler.can_assign_more());
        scheduler.assign_task("a", "worker1").unwrap();
        assert!(!scheduler.can_assign_more());
    }
}
