//! Refinery coordinator. The single consumer of the merge queue:
//! guarded by a `processing` flag so at most one merge pipeline runs at a
//! time, with non-blocking re-arm after each attempt. Grounded on
//! `services/event_scheduler.rs`'s single-flight "guarded tick" shape and
//! `services/circuit_breaker.rs`'s edge-triggered event emission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::models::{MergeOutcome, MergeRequestInput, MergeRequestStatus};
use crate::services::conflict_resolver::{ConflictResolver, ResolveOutcome};
use crate::services::merge_queue::MergeQueue;
use crate::services::merger::Merger;

#[derive(Debug, Clone)]
pub enum RefineryEvent {
    BranchQueued { branch: String },
    MergeStarted { branch: String },
    MergeCompleted { branch: String, merge_commit: String },
    MergeConflict { branch: String },
    ConflictResolving { branch: String },
    ConflictEscalated { branch: String },
    MergeFailed { branch: String },
}

pub struct RefineryConfig {
    pub max_retries: u32,
}

pub struct Refinery {
    queue: Arc<MergeQueue>,
    merger: Arc<Merger>,
    resolver: Arc<ConflictResolver>,
    config: RefineryConfig,
    processing: AtomicBool,
    stopped: AtomicBool,
    event_sender: Option<mpsc::Sender<RefineryEvent>>,
}

impl Refinery {
    pub fn new(
        queue: Arc<MergeQueue>,
        merger: Arc<Merger>,
        resolver: Arc<ConflictResolver>,
        config: RefineryConfig,
    ) -> Self {
        Self {
            queue,
            merger,
            resolver,
            config,
            processing: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, sender: mpsc::Sender<RefineryEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    fn emit(&self, event: RefineryEvent) {
        if let Some(ref sender) = self.event_sender {
            let _ = sender.try_send(event);
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn start(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Builds a `MergeRequest` from worker state and enqueues it, then
    /// triggers `process_next` without blocking the caller.
    pub async fn queue_branch(self: &Arc<Self>, input: MergeRequestInput) {
        let branch = input.branch.clone();
        self.queue.enqueue(input).await;
        self.emit(RefineryEvent::BranchQueued { branch });

        let refinery = Arc::clone(self);
        tokio::spawn(async move {
            refinery.process_next().await;
        });
    }

    /// Processes at most one merge request. No-ops if already processing,
    /// stopped, or the queue is empty. Re-arms itself if more work remains.
    pub async fn process_next(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let Some(request) = self.queue.dequeue().await else {
            self.processing.store(false, Ordering::SeqCst);
            return;
        };

        info!(branch = %request.branch, "merge started");
        self.emit(RefineryEvent::MergeStarted {
            branch: request.branch.clone(),
        });

        let outcome = self.merger.merge(&request.branch, &request.task_id).await;
        self.handle_outcome(&request.id, &request.branch, request.retry_count, outcome)
            .await;

        self.processing.store(false, Ordering::SeqCst);

        if !self.stopped.load(Ordering::SeqCst) && self.queue.has_queued().await {
            let refinery = Arc::clone(self);
            tokio::spawn(async move {
                refinery.process_next().await;
            });
        }
    }

    async fn handle_outcome(&self, id: &uuid::Uuid, branch: &str, retry_count: u32, outcome: MergeOutcome) {
        if outcome.success {
            let merge_commit = outcome.merge_commit.unwrap_or_default();
            let _ = self.queue.update_status(*id, MergeRequestStatus::Merged, None).await;
            self.resolver.reset_attempts(branch).await;
            info!(branch, %merge_commit, "merge completed");
            self.emit(RefineryEvent::MergeCompleted {
                branch: branch.to_string(),
                merge_commit,
            });
            return;
        }

        if outcome.conflict {
            let _ = self
                .queue
                .update_status(*id, MergeRequestStatus::Conflict, outcome.error.clone())
                .await;
            self.emit(RefineryEvent::MergeConflict {
                branch: branch.to_string(),
            });
            self.emit(RefineryEvent::ConflictResolving {
                branch: branch.to_string(),
            });
            let resolved = self
                .resolver
                .resolve(*id, branch, outcome.conflict_files, &self.queue, None)
                .await;
            if resolved == ResolveOutcome::Escalated {
                self.emit(RefineryEvent::ConflictEscalated {
                    branch: branch.to_string(),
                });
            }
            return;
        }

        // Non-conflict failure (including test failures).
        if retry_count < self.config.max_retries {
            let _ = self
                .queue
                .update_status(*id, MergeRequestStatus::Failed, outcome.error.clone())
                .await;
            let _ = self.queue.requeue(*id).await;
        } else {
            warn!(branch, "merge failed permanently after exhausting retries");
            let _ = self
                .queue
                .update_status(*id, MergeRequestStatus::Failed, outcome.error)
                .await;
            self.emit(RefineryEvent::MergeFailed {
                branch: branch.to_string(),
            });
        }
    }
}
