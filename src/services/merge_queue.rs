//! Merge queue. An in-memory, priority-ordered collection of
//! pending merges with the invariant that at most one request is
//! `merging` at a time. Follows the dequeue-by-scan and status-machine
//! shape of a two-stage merge queue, collapsed here to the single-stage
//! `MergeRequest`/`MergeRequestStatus` model the merger and conflict
//! resolver share.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MergeRequest, MergeRequestInput, MergeRequestStatus};

#[derive(Default)]
struct Inner {
    requests: Vec<MergeRequest>,
}

pub struct MergeQueue {
    inner: Arc<RwLock<Inner>>,
}

impl Default for MergeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    pub async fn enqueue(&self, input: MergeRequestInput) -> MergeRequest {
        let request = MergeRequest::new(input);
        debug!(branch = %request.branch, id = %request.id, "merge request queued");
        self.inner.write().await.requests.push(request.clone());
        request
    }

    /// Selects the highest-scoring `queued` request, transitions it to
    /// `merging`, and returns it. Callers must not call `dequeue`
    /// concurrently with an in-flight merge — the queue itself doesn't
    /// enforce the single-flight invariant beyond this transition.
    pub async fn dequeue(&self) -> Option<MergeRequest> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let best = inner
            .requests
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == MergeRequestStatus::Queued)
            .max_by(|(ai, a), (bi, b)| {
                a.priority_score(now)
                    .partial_cmp(&b.priority_score(now))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| bi.cmp(ai)) // FIFO tiebreaker: earlier index wins
            })
            .map(|(i, _)| i)?;

        inner.requests[best].status = MergeRequestStatus::Merging;
        Some(inner.requests[best].clone())
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: MergeRequestStatus,
        error: Option<String>,
    ) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        let request = inner
            .requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DomainError::GitError(format!("unknown merge request {id}")))?;

        if matches!(status, MergeRequestStatus::Conflict | MergeRequestStatus::Failed) {
            request.retry_count += 1;
        }
        request.status = status;
        request.last_error = error;
        Ok(())
    }

    /// Valid only from `conflict` or `failed`; resets to `queued`.
    pub async fn requeue(&self, id: Uuid) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        let request = inner
            .requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DomainError::GitError(format!("unknown merge request {id}")))?;

        if !matches!(request.status, MergeRequestStatus::Conflict | MergeRequestStatus::Failed) {
            return Err(DomainError::GitError(format!(
                "cannot requeue merge request {id} from status {:?}",
                request.status
            )));
        }
        request.status = MergeRequestStatus::Queued;
        request.last_error = None;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Option<MergeRequest> {
        self.inner.read().await.requests.iter().find(|r| r.id == id).cloned()
    }

    pub async fn list(&self) -> Vec<MergeRequest> {
        self.inner.read().await.requests.clone()
    }

    pub async fn has_queued(&self) -> bool {
        self.inner
            .read()
            .await
            .requests
            .iter()
            .any(|r| r.status == MergeRequestStatus::Queued)
    }

    pub async fn is_any_merging(&self) -> bool {
        self.inner
            .read()
            .await
            .requests
            .iter()
            .any(|r| r.status == MergeRequestStatus::Merging)
    }

    /// Replaces the queue's contents wholesale — used when restoring from
    /// a session snapshot.
    pub async fn restore(&self, requests: Vec<MergeRequest>) {
        self.inner.write().await.requests = requests;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(branch: &str, priority: u8, unblock_count: u32) -> MergeRequestInput {
        MergeRequestInput {
            branch: branch.to_string(),
            worker_name: "worker1".to_string(),
            task_id: branch.to_string(),
            priority,
            unblock_count,
        }
    }

    #[tokio::test]
    async fn dequeue_selects_highest_priority_score_first() {
        let queue = MergeQueue::new();
        queue.enqueue(input("low", 4, 0)).await;
        let high = queue.enqueue(input("high", 0, 0)).await;

        let dequeued = queue.dequeue().await.unwrap();
        assert_eq!(dequeued.id, high.id);
        assert_eq!(dequeued.status, MergeRequestStatus::Merging);
    }

    #[tokio::test]
    async fn dequeue_returns_none_when_empty_or_all_in_flight() {
        let queue = MergeQueue::new();
        assert!(queue.dequeue().await.is_none());

        queue.enqueue(input("only", 0, 0)).await;
        let first = queue.dequeue().await;
        assert!(first.is_some());
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn requeue_only_valid_from_conflict_or_failed() {
        let queue = MergeQueue::new();
        let request = queue.enqueue(input("a", 0, 0)).await;
        assert!(queue.requeue(request.id).await.is_err());

        queue
            .update_status(request.id, MergeRequestStatus::Conflict, Some("boom".into()))
            .await
            .unwrap();
        queue.requeue(request.id).await.unwrap();
        let reloaded = queue.get(request.id).await.unwrap();
        assert_eq!(reloaded.status, MergeRequestStatus::Queued);
        assert!(reloaded.last_error.is_none());
    }

    #[tokio::test]
    async fn update_status_bumps_retry_count_on_conflict_and_failed() {
        let queue = MergeQueue::new();
        let request = queue.enqueue(input("a", 0, 0)).await;
        queue
            .update_status(request.id, MergeRequestStatus::Conflict, None)
            .await
            .unwrap();
        let reloaded = queue.get(request.id).await.unwrap();
        assert_eq!(reloaded.retry_count, 1);
    }
}
