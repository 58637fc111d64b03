//! Per-worker bookkeeping owned by the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::iteration_result::SubagentTraceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
    RateLimited,
    Done,
    Error,
    Interrupted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub name: String,
    pub working_copy_path: String,
    pub branch: String,
    pub agent_id: String,
    pub task_id: Option<String>,
    pub status: WorkerStatus,
    pub iteration: u32,
    #[serde(default)]
    pub accumulated_stdout: String,
    #[serde(default)]
    pub subagent_trace: Vec<SubagentTraceEvent>,
    pub started_at: DateTime<Utc>,
    pub error: Option<String>,
    #[serde(default)]
    pub paused: bool,
}

impl WorkerRecord {
    pub fn new(name: String, working_copy_path: String, branch: String, agent_id: String) -> Self {
        Self {
            name,
            working_copy_path,
            branch,
            agent_id,
            task_id: None,
            status: WorkerStatus::Idle,
            iteration: 0,
            accumulated_stdout: String::new(),
            subagent_trace: Vec::new(),
            started_at: Utc::now(),
            error: None,
            paused: false,
        }
    }
}
