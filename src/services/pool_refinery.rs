//! Pool-refinery bridge. A thin wiring object with no logic of its own
//! beyond translating dispatcher worker events into refinery merge
//! requests and refinery outcomes back into dispatcher cleanup. Grounded
//! on `services/swarm_orchestrator/event_handling.rs`'s pattern of a small
//! struct that only forwards events between an orchestrator and a queue,
//! owning no state beyond the in-flight mapping needed to reconnect one
//! event stream to the other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::domain::models::{MergeRequestInput, Task, TaskFilter};
use crate::domain::ports::Tracker;
use crate::services::dispatcher::Dispatcher;
use crate::services::refinery::{Refinery, RefineryEvent};
use crate::services::worker::WorkerEvent;

#[derive(Debug, Clone)]
pub enum PoolEvent {
    MergeCompleted { task_id: String, merge_commit: String },
    MergeFailed { task_id: String },
}

struct PendingMerge {
    worker: String,
    task_id: String,
}

pub struct PoolRefineryBridge {
    dispatcher: Arc<Dispatcher>,
    refinery: Arc<Refinery>,
    tracker: Arc<dyn Tracker>,
    pending: Mutex<HashMap<String, PendingMerge>>,
    event_sender: Option<mpsc::Sender<PoolEvent>>,
}

impl PoolRefineryBridge {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        refinery: Arc<Refinery>,
        tracker: Arc<dyn Tracker>,
        event_sender: Option<mpsc::Sender<PoolEvent>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            refinery,
            tracker,
            pending: Mutex::new(HashMap::new()),
            event_sender,
        })
    }

    fn emit(&self, event: PoolEvent) {
        if let Some(ref sender) = self.event_sender {
            let _ = sender.try_send(event);
        }
    }

    /// Spawns the two listener loops. Either channel closing ends its own
    /// loop only; listener panics are avoided by design rather than caught,
    /// since both loops only ever call infallible bridge methods.
    pub fn spawn(
        self: &Arc<Self>,
        mut worker_events: mpsc::Receiver<WorkerEvent>,
        mut refinery_events: mpsc::Receiver<RefineryEvent>,
    ) {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = worker_events.recv().await {
                bridge.handle_worker_event(event).await;
            }
        });

        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = refinery_events.recv().await {
                bridge.handle_refinery_event(event).await;
            }
        });
    }

    async fn handle_worker_event(&self, event: WorkerEvent) {
        let WorkerEvent::TaskCompleted { worker, task_id } = event else {
            return;
        };

        let Some(record) = self
            .dispatcher
            .worker_records()
            .await
            .into_iter()
            .find(|r| r.name == worker)
        else {
            warn!(worker, "task completed for a worker with no known record");
            return;
        };

        let priority = self
            .tracker
            .get_task(&task_id)
            .await
            .ok()
            .flatten()
            .map_or(Task::MAX_PRIORITY, |t| t.clamp_priority());
        let unblock_count = self.compute_unblock_count(&task_id).await;

        let input = MergeRequestInput {
            branch: record.branch.clone(),
            worker_name: worker.clone(),
            task_id: task_id.clone(),
            priority,
            unblock_count,
        };

        info!(worker, task_id, branch = %record.branch, "queueing completed worker branch for merge");
        self.pending.lock().await.insert(
            record.branch.clone(),
            PendingMerge {
                worker,
                task_id,
            },
        );
        self.refinery.queue_branch(input).await;
    }

    /// Number of tasks whose dependency list names `task_id` — the count
    /// of tasks this merge would unblock.
    async fn compute_unblock_count(&self, task_id: &str) -> u32 {
        match self.tracker.get_tasks(&TaskFilter::default()).await {
            Ok(tasks) => tasks
                .iter()
                .filter(|t| t.dependencies.iter().any(|dep| dep == task_id))
                .count() as u32,
            Err(e) => {
                warn!(task_id, error = %e, "failed to compute unblock count");
                0
            }
        }
    }

    async fn handle_refinery_event(&self, event: RefineryEvent) {
        match event {
            RefineryEvent::MergeCompleted { branch, merge_commit } => {
                let Some(pending) = self.pending.lock().await.remove(&branch) else {
                    return;
                };
                if let Err(e) = self
                    .dispatcher
                    .release_worker(&pending.worker, &pending.task_id, true)
                    .await
                {
                    warn!(worker = %pending.worker, error = %e, "failed to release worker after merge");
                }
                self.emit(PoolEvent::MergeCompleted {
                    task_id: pending.task_id,
                    merge_commit,
                });
            }
            RefineryEvent::MergeFailed { branch } => {
                // Drop tracking but keep the working copy in place for
                // post-mortem inspection; the worker and its branch are
                // left exactly as they were.
                if let Some(pending) = self.pending.lock().await.remove(&branch) {
                    self.emit(PoolEvent::MergeFailed {
                        task_id: pending.task_id,
                    });
                }
            }
            RefineryEvent::BranchQueued { .. }
            | RefineryEvent::MergeStarted { .. }
            | RefineryEvent::MergeConflict { .. }
            | RefineryEvent::ConflictResolving { .. }
            | RefineryEvent::ConflictEscalated { .. } => {}
        }
    }
}
