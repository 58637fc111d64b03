//! An `Assignment` binds a ready task to a worker.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: String,
    pub worker_name: String,
    pub dependencies: Vec<String>,
    /// Planner-provided parallel-track number; 0 when no planner is wired.
    pub track: u32,
}
