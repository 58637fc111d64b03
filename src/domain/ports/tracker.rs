//! Tracker capability port. Generalized from `task_repository.rs`'s
//! persistence contract into the read-mostly, externally-owned surface the
//! scheduler consumes — a json-file-backed tracker and a CLI-backed
//! tracker (`bd`/`bv`) are both valid adapters.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CompleteTaskOutcome, Epic, Task, TaskFilter};

/// Read/update access to the external task tracker.
///
/// The tracker is expected to expose a `ready` semantic that approximates
/// "dependencies satisfied from the tracker's viewpoint"; the scheduler
/// layers the stricter "merged" check on top of it.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn get_tasks(&self, filter: &TaskFilter) -> DomainResult<Vec<Task>>;

    async fn get_task(&self, id: &str) -> DomainResult<Option<Task>>;

    /// Highest-priority ready task matching `filter`, if any.
    async fn get_next_task(&self, filter: &TaskFilter) -> DomainResult<Option<Task>>;

    async fn update_task_status(
        &self,
        id: &str,
        status: crate::domain::models::TaskStatus,
    ) -> DomainResult<Option<Task>>;

    async fn complete_task(
        &self,
        id: &str,
        reason: Option<&str>,
    ) -> DomainResult<CompleteTaskOutcome>;

    /// Optional grouping of tasks under epics; an empty vec when the
    /// backing tracker doesn't support epics.
    async fn get_epics(&self) -> DomainResult<Vec<Epic>>;
}
