//! Result of a single agent iteration inside a worker. Generalized from
//! `application/agent_executor.rs`'s
//! `ExecutionContext`/result types, which modeled a single API round-trip;
//! here it models one subprocess invocation of the coding agent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Completed,
    TaskCompleted,
    Failed,
    RateLimited,
    Interrupted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub message: String,
    pub retry_after_seconds: Option<u64>,
}

/// One event emitted while tokenizing an agent's combined stdout/stderr
/// stream into a subagent trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubagentTraceEvent {
    /// A subagent (Task-tool invocation) was spawned.
    Spawned { name: String, description: String },
    /// A subagent reported incremental progress text.
    Progress { name: String, text: String },
    /// A subagent finished, successfully or not.
    Completed { name: String, success: bool },
    /// Text that didn't match a recognized trace marker, kept for display.
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    pub status: IterationStatus,
    pub duration_ms: u64,
    pub output: String,
    pub error: Option<String>,
    pub rate_limit: Option<RateLimitInfo>,
    #[serde(default)]
    pub subagent_trace: Vec<SubagentTraceEvent>,
    /// Whether the output contained the `<promise>COMPLETE</promise>`
    /// completion sentinel (matched case-insensitively).
    pub promise_complete: bool,
}

impl IterationResult {
    pub fn completed(output: String, duration_ms: u64, promise_complete: bool) -> Self {
        Self {
            status: if promise_complete {
                IterationStatus::TaskCompleted
            } else {
                IterationStatus::Completed
            },
            duration_ms,
            output,
            error: None,
            rate_limit: None,
            subagent_trace: Vec::new(),
            promise_complete,
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: IterationStatus::Failed,
            duration_ms,
            output: String::new(),
            error: Some(error.into()),
            rate_limit: None,
            subagent_trace: Vec::new(),
            promise_complete: false,
        }
    }

    pub fn rate_limited(info: RateLimitInfo, duration_ms: u64) -> Self {
        Self {
            status: IterationStatus::RateLimited,
            duration_ms,
            output: String::new(),
            error: None,
            rate_limit: Some(info),
            subagent_trace: Vec::new(),
            promise_complete: false,
        }
    }

    pub fn interrupted(duration_ms: u64) -> Self {
        Self {
            status: IterationStatus::Interrupted,
            duration_ms,
            output: String::new(),
            error: None,
            rate_limit: None,
            subagent_trace: Vec::new(),
            promise_complete: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_without_sentinel_is_plain_completed() {
        let result = IterationResult::completed("did some work".into(), 1200, false);
        assert_eq!(result.status, IterationStatus::Completed);
        assert!(!result.promise_complete);
    }

    #[test]
    fn completed_with_sentinel_is_task_completed() {
        let result = IterationResult::completed("<promise>COMPLETE</promise>".into(), 800, true);
        assert_eq!(result.status, IterationStatus::TaskCompleted);
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let info = RateLimitInfo {
            message: "rate limited".into(),
            retry_after_seconds: Some(30),
        };
        let result = IterationResult::rate_limited(info, 50);
        assert_eq!(result.status, IterationStatus::RateLimited);
        assert_eq!(
            result.rate_limit.as_ref().unwrap().retry_after_seconds,
            Some(30)
        );
    }
}
