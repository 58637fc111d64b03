//! Conflict resolver. Decides, per branch, whether to attempt a
//! rebase-and-retry or escalate a merge conflict to a human. Grounded on
//! the retry/backoff bookkeeping style of `services/circuit_breaker.rs`
//! (a per-key attempt counter plus an edge-triggered event), adapted here
//! to a one-shot policy decision rather than a continuously-open circuit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::config::ConflictStrategy;
use crate::services::merge_queue::MergeQueue;

/// Issues a rebase attempt against a dedicated worker. Implemented by the
/// dispatcher, which owns the worker pool; kept as a narrow trait here so
/// the resolver doesn't depend on pool internals.
#[async_trait]
pub trait RebaseExecutor: Send + Sync {
    /// Fetches `target`, rebases `branch` onto it, and force-pushes with
    /// lease. Returns `Ok(true)` on success, `Ok(false)` on a rebase
    /// failure that isn't itself an error (conflicting rebase).
    async fn rebase(&self, branch: &str, target: &str) -> DomainResult<bool>;
}

#[derive(Debug, Clone)]
pub enum ConflictEvent {
    RebaseStarted { branch: String, attempt: u32 },
    MergeRequeued { branch: String },
    ConflictEscalated { branch: String, files: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct ConflictResolverConfig {
    pub max_rebase_attempts: u32,
    pub default_strategy: ConflictStrategy,
    pub target_branch: String,
}

pub struct ConflictResolver {
    config: ConflictResolverConfig,
    attempts: RwLock<HashMap<String, u32>>,
    rebase_executor: Option<Arc<dyn RebaseExecutor>>,
    event_sender: Option<mpsc::Sender<ConflictEvent>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Escalated,
    RequeuedAfterRebase,
    Unresolved,
}

impl ConflictResolver {
    pub fn new(config: ConflictResolverConfig, rebase_executor: Option<Arc<dyn RebaseExecutor>>) -> Self {
        Self {
            config,
            attempts: RwLock::new(HashMap::new()),
            rebase_executor,
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, sender: mpsc::Sender<ConflictEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    fn emit(&self, event: ConflictEvent) {
        if let Some(ref sender) = self.event_sender {
            let _ = sender.try_send(event);
        }
    }

    pub async fn reset_attempts(&self, branch: &str) {
        self.attempts.write().await.remove(branch);
    }

    async fn escalate(&self, branch: &str, files: Vec<String>) -> ResolveOutcome {
        self.attempts.write().await.remove(branch);
        warn!(branch, "escalating merge conflict");
        self.emit(ConflictEvent::ConflictEscalated {
            branch: branch.to_string(),
            files,
        });
        ResolveOutcome::Escalated
    }

    /// Resolves a conflict detected on `branch`. `strategy_override`, when
    /// present, takes precedence over the configured default.
    pub async fn resolve(
        &self,
        merge_request_id: Uuid,
        branch: &str,
        conflict_files: Vec<String>,
        queue: &MergeQueue,
        strategy_override: Option<ConflictStrategy>,
    ) -> ResolveOutcome {
        let strategy = strategy_override.unwrap_or(self.config.default_strategy);

        if strategy == ConflictStrategy::Escalate {
            return self.escalate(branch, conflict_files).await;
        }

        let attempt = {
            let mut attempts = self.attempts.write().await;
            let count = attempts.entry(branch.to_string()).or_insert(0);
            if *count >= self.config.max_rebase_attempts {
                drop(attempts);
                return self.escalate(branch, conflict_files).await;
            }
            *count += 1;
            *count
        };

        info!(branch, attempt, "starting rebase attempt");
        self.emit(ConflictEvent::RebaseStarted {
            branch: branch.to_string(),
            attempt,
        });

        let Some(executor) = self.rebase_executor.as_ref() else {
            // No worker pool available (e.g. direct invocation in tests):
            // escalate immediately rather than pretend a rebase happened.
            return self.escalate(branch, conflict_files).await;
        };

        match executor.rebase(branch, &self.config.target_branch).await {
            Ok(true) => {
                if queue.requeue(merge_request_id).await.is_ok() {
                    self.emit(ConflictEvent::MergeRequeued {
                        branch: branch.to_string(),
                    });
                    ResolveOutcome::RequeuedAfterRebase
                } else {
                    ResolveOutcome::Unresolved
                }
            }
            Ok(false) | Err(_) => {
                if attempt >= self.config.max_rebase_attempts {
                    self.escalate(branch, conflict_files).await
                } else {
                    ResolveOutcome::Unresolved
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MergeRequestInput;

    struct AlwaysSucceeds;
    #[async_trait]
    impl RebaseExecutor for AlwaysSucceeds {
        async fn rebase(&self, _branch: &str, _target: &str) -> DomainResult<bool> {
            Ok(true)
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl RebaseExecutor for AlwaysFails {
        async fn rebase(&self, _branch: &str, _target: &str) -> DomainResult<bool> {
            Ok(false)
        }
    }

    fn config(max_attempts: u32, strategy: ConflictStrategy) -> ConflictResolverConfig {
        ConflictResolverConfig {
            max_rebase_attempts: max_attempts,
            default_strategy: strategy,
            target_branch: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn escalate_strategy_clears_attempts_and_escalates_immediately() {
        let resolver = ConflictResolver::new(config(3, ConflictStrategy::Escalate), None);
        let queue = MergeQueue::new();
        let outcome = resolver
            .resolve(Uuid::new_v4(), "work/w1/T1", vec!["a.rs".into()], &queue, None)
            .await;
        assert_eq!(outcome, ResolveOutcome::Escalated);
    }

    #[tokio::test]
    async fn no_executor_escalates_immediately_even_under_rebase_strategy() {
        let resolver = ConflictResolver::new(config(3, ConflictStrategy::Rebase), None);
        let queue = MergeQueue::new();
        let outcome = resolver
            .resolve(Uuid::new_v4(), "work/w1/T1", vec![], &queue, None)
            .await;
        assert_eq!(outcome, ResolveOutcome::Escalated);
    }

    #[tokio::test]
    async fn successful_rebase_requeues_the_merge_request() {
        let resolver =
            ConflictResolver::new(config(3, ConflictStrategy::Rebase), Some(Arc::new(AlwaysSucceeds)));
        let queue = MergeQueue::new();
        let request = queue
            .enqueue(MergeRequestInput {
                branch: "work/w1/T1".into(),
                worker_name: "worker1".into(),
                task_id: "T1".into(),
                priority: 0,
                unblock_count: 0,
            })
            .await;
        queue.dequeue().await;
        queue
            .update_status(request.id, crate::domain::models::MergeRequestStatus::Conflict, None)
            .await
            .unwrap();

        let outcome = resolver
            .resolve(request.id, "work/w1/T1", vec!["a.rs".into()], &queue, None)
            .await;
        assert_eq!(outcome, ResolveOutcome::RequeuedAfterRebase);
    }

    #[tokio::test]
    async fn exhausting_rebase_attempts_escalates() {
        let resolver =
            ConflictResolver::new(config(2, ConflictStrategy::Rebase), Some(Arc::new(AlwaysFails)));
        let queue = MergeQueue::new();
        let branch = "work/w1/T1";
        let id = Uuid::new_v4();

        let first = resolver.resolve(id, branch, vec![], &queue, None).await;
        assert_eq!(first, ResolveOutcome::Unresolved);
        let second = resolver.resolve(id, branch, vec![], &queue, None).await;
        assert_eq!(second, ResolveOutcome::Escalated);
    }
}
