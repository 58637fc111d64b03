//! Worker state machine. Drives a single coding-agent CLI through
//! repeated iterations against one task in one isolated working-copy.
//! Grounded on `application/mcp_process_manager.rs`'s child-process
//! lifecycle (spawn, graceful-then-forceful stop) generalized from two
//! fixed servers to one agent invocation per iteration, and on
//! `services/circuit_breaker.rs`'s edge-triggered event emission style.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    IterationResult, IterationStatus, Task, TaskStatus, WorkerRecord, WorkerStatus, WorkingCopy,
};
use crate::domain::ports::{Agent, ExecutionOptions, Tracker};
use crate::infrastructure::logging::SecretScrubbingLayer;
use crate::infrastructure::session::{IterationLogEntry, IterationLogWriter};
use crate::services::rate_limit_detector::{self, AgentOutput};

static PROMISE_COMPLETE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<promise>\s*complete\s*</promise>").unwrap());

static SCRUBBER: Lazy<SecretScrubbingLayer> = Lazy::new(SecretScrubbingLayer::new);

/// External stop signal for a worker whose ownership has moved into its
/// background iteration-loop task.
#[derive(Clone)]
pub struct WorkerController {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl WorkerController {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    TaskStarted { worker: String, task_id: String },
    TaskCompleted { worker: String, task_id: String },
    RateLimited { worker: String, agent_id: String },
}

pub struct Worker {
    tracker: Arc<dyn Tracker>,
    agent: Box<dyn Agent>,
    working_copy: WorkingCopy,
    model: Option<String>,
    record: WorkerRecord,
    event_sender: Option<tokio::sync::mpsc::Sender<WorkerEvent>>,
    iteration_log: Option<Arc<IterationLogWriter>>,
    stopped: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
}

impl Worker {
    pub fn new(
        name: String,
        working_copy: WorkingCopy,
        agent: Box<dyn Agent>,
        tracker: Arc<dyn Tracker>,
        model: Option<String>,
    ) -> Self {
        let agent_id = agent.metadata().id;
        let record = WorkerRecord::new(name, working_copy.path.clone(), working_copy.branch.clone(), agent_id);
        Self {
            tracker,
            agent,
            working_copy,
            model,
            record,
            event_sender: None,
            iteration_log: None,
            stopped: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
        }
    }

    pub fn with_event_sender(mut self, sender: tokio::sync::mpsc::Sender<WorkerEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn with_iteration_log(mut self, writer: Arc<IterationLogWriter>) -> Self {
        self.iteration_log = Some(writer);
        self
    }

    /// A cloneable handle that lets the dispatcher signal a stop from
    /// outside the task that owns this worker, since `Worker` itself moves
    /// into its iteration-loop task.
    pub fn controller(&self) -> WorkerController {
        WorkerController {
            stopped: Arc::clone(&self.stopped),
            notify: Arc::clone(&self.stop_notify),
        }
    }

    fn emit(&self, event: WorkerEvent) {
        if let Some(ref sender) = self.event_sender {
            let _ = sender.try_send(event);
        }
    }

    pub fn record(&self) -> &WorkerRecord {
        &self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn working_copy(&self) -> &WorkingCopy {
        &self.working_copy
    }

    pub async fn assign_task(&mut self, task: &Task) -> DomainResult<()> {
        if self.record.status != WorkerStatus::Idle || self.record.task_id.is_some() {
            return Err(DomainError::AlreadyAssigned(task.id.clone()));
        }
        self.tracker.update_task_status(&task.id, TaskStatus::InProgress).await?;
        self.record.task_id = Some(task.id.clone());
        self.record.status = WorkerStatus::Working;
        self.record.iteration = 0;
        self.record.accumulated_stdout.clear();
        self.record.subagent_trace.clear();
        self.record.error = None;
        info!(worker = %self.record.name, task_id = %task.id, "task assigned");
        self.emit(WorkerEvent::TaskStarted {
            worker: self.record.name.clone(),
            task_id: task.id.clone(),
        });
        Ok(())
    }

    fn build_prompt(task: &Task) -> String {
        format!(
            "## Task\n**ID**: {id}\n**Title**: {title}\n\n## Description\n{description}\n\n## Instructions\nComplete the task described above. When finished, signal completion with:\n<promise>COMPLETE</promise>\n",
            id = task.id,
            title = task.title,
            description = task.description,
        )
    }

    /// Runs a single iteration: invokes the agent, classifies the raw
    /// result through the rate-limit detector and completion sentinel, and
    /// updates worker state accordingly.
    pub async fn execute_iteration(&mut self, task: &Task) -> DomainResult<IterationResult> {
        if self.record.status != WorkerStatus::Working {
            return Err(DomainError::GitError(format!(
                "worker {} is not in working state",
                self.record.name
            )));
        }

        while self.record.paused {
            if self.stopped.load(Ordering::SeqCst) {
                self.record.status = WorkerStatus::Interrupted;
                return Ok(IterationResult::interrupted(0));
            }
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }

        self.record.iteration += 1;
        let prompt = Self::build_prompt(task);
        let options = ExecutionOptions {
            working_dir: self.working_copy.path.clone(),
            timeout_ms: None,
            extra_args: self.model.clone().map_or_else(Vec::new, |m| vec!["--model".to_string(), m]),
        };

        let started = Instant::now();
        let started_at = Utc::now();
        let handle = self.agent.execute(&prompt, &[], options).await?;

        let wait_task = tokio::spawn(async move { handle.wait().await });
        let abort_handle = wait_task.abort_handle();

        let raw = tokio::select! {
            () = self.stop_notify.notified() => {
                abort_handle.abort();
                Ok(IterationResult::interrupted(started.elapsed().as_millis() as u64))
            }
            joined = wait_task => {
                match joined {
                    Ok(result) => result,
                    Err(_) => Ok(IterationResult::interrupted(started.elapsed().as_millis() as u64)),
                }
            }
        }?;
        let ended_at = Utc::now();
        let raw_stdout = raw.output.clone();
        let raw_stderr = raw.error.clone();

        let result = self.classify(raw);
        self.record
            .accumulated_stdout
            .push_str(&SCRUBBER.scrub_message(&result.output));
        self.record.subagent_trace.extend(result.subagent_trace.clone());

        self.write_iteration_log(task, &result, started_at, ended_at, raw_stdout, raw_stderr)
            .await;

        match result.status {
            IterationStatus::Interrupted => {
                self.record.status = WorkerStatus::Interrupted;
            }
            IterationStatus::Failed => {
                self.record.status = WorkerStatus::Error;
                self.record.error = result.error.clone();
            }
            IterationStatus::RateLimited => {
                self.record.status = WorkerStatus::RateLimited;
                warn!(worker = %self.record.name, agent = %self.record.agent_id, "iteration rate-limited");
                self.emit(WorkerEvent::RateLimited {
                    worker: self.record.name.clone(),
                    agent_id: self.record.agent_id.clone(),
                });
            }
            IterationStatus::TaskCompleted => {
                let task_id = task.id.clone();
                self.tracker.complete_task(&task_id, None).await?;
                self.record.status = WorkerStatus::Done;
                info!(worker = %self.record.name, task_id = %task_id, "task completed");
                self.emit(WorkerEvent::TaskCompleted {
                    worker: self.record.name.clone(),
                    task_id,
                });
            }
            IterationStatus::Completed => {}
        }

        Ok(result)
    }

    /// Best-effort transcript write; a log failure never fails the
    /// iteration itself.
    async fn write_iteration_log(
        &self,
        task: &Task,
        result: &IterationResult,
        started_at: chrono::DateTime<Utc>,
        ended_at: chrono::DateTime<Utc>,
        stdout: String,
        stderr: Option<String>,
    ) {
        let Some(writer) = self.iteration_log.as_ref() else {
            return;
        };
        let entry = IterationLogEntry {
            iteration: self.record.iteration,
            task_id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            epic: task.parent_id.clone(),
            status: result.status,
            task_completed: result.status == IterationStatus::TaskCompleted,
            promise_detected: result.promise_complete,
            started_at,
            ended_at,
            duration_ms: result.duration_ms,
            error: result.error.clone().or_else(|| result.rate_limit.as_ref().map(|r| r.message.clone())),
            agent: self.record.agent_id.clone(),
            model: self.model.clone(),
            stdout,
            stderr,
        };
        if let Err(e) = writer.write(&entry).await {
            warn!(worker = %self.record.name, error = %e, "failed to write iteration log");
        }
    }

    /// Reclassifies a raw iteration result by first checking for rate-limit
    /// text, then the completion sentinel. Interrupted results pass through
    /// untouched — interruption always wins.
    fn classify(&self, raw: IterationResult) -> IterationResult {
        if raw.status == IterationStatus::Interrupted {
            return raw;
        }

        let detection = rate_limit_detector::detect(&AgentOutput {
            stdout: &raw.output,
            stderr: raw.error.as_deref().unwrap_or(""),
            exit_code: None,
            agent_id: &self.record.agent_id,
        });

        if detection.is_rate_limit {
            let info = detection.info.unwrap_or(crate::domain::models::iteration_result::RateLimitInfo {
                message: "rate limited".to_string(),
                retry_after_seconds: None,
            });
            return IterationResult::rate_limited(info, raw.duration_ms);
        }

        if raw.error.is_some() {
            return IterationResult::failed(raw.error.unwrap_or_default(), raw.duration_ms);
        }

        let promise_complete = PROMISE_COMPLETE.is_match(&raw.output);
        let task_completed = promise_complete || raw.status == IterationStatus::TaskCompleted;
        let mut result = IterationResult::completed(raw.output, raw.duration_ms, task_completed);
        result.subagent_trace = raw.subagent_trace;
        result
    }

    /// Replaces the agent capability. If currently rate-limited, resumes
    /// to working — the caller is expected to have already confirmed the
    /// new agent is available.
    pub fn switch_agent(&mut self, agent: Box<dyn Agent>) {
        self.record.agent_id = agent.metadata().id;
        self.agent = agent;
        if self.record.status == WorkerStatus::RateLimited {
            self.record.status = WorkerStatus::Working;
        }
    }

    /// Interrupts the in-flight iteration immediately, if any, and marks
    /// the worker interrupted.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_notify.notify_one();
        self.record.status = WorkerStatus::Interrupted;
    }

    pub fn pause(&mut self) {
        self.record.paused = true;
    }

    pub fn resume(&mut self) {
        self.record.paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_task_fields_and_completion_sentinel() {
        let task = Task {
            id: "T1".into(),
            title: "Fix bug".into(),
            description: "Do the thing".into(),
            status: TaskStatus::Open,
            priority: 0,
            dependencies: Vec::new(),
            parent_id: None,
            ready: true,
        };
        let prompt = Worker::build_prompt(&task);
        assert!(prompt.contains("T1"));
        assert!(prompt.contains("Fix bug"));
        assert!(prompt.contains("Do the thing"));
        assert!(prompt.contains("<promise>COMPLETE</promise>"));
    }

    #[test]
    fn promise_complete_regex_is_case_insensitive_and_tolerates_whitespace() {
        assert!(PROMISE_COMPLETE.is_match("done. <promise> complete </promise>"));
        assert!(PROMISE_COMPLETE.is_match("<PROMISE>COMPLETE</PROMISE>"));
        assert!(!PROMISE_COMPLETE.is_match("no sentinel here"));
    }
}
