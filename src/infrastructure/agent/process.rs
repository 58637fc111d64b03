//! Agent subprocess lifecycle. Grounded on
//! `application/mcp_process_manager.rs`'s piped-child spawn plus
//! `start_kill`-then-timeout shutdown sequence, generalized from two
//! long-lived MCP servers to one short-lived process per worker
//! iteration, and on `cli/service/swarm_service.rs`'s SIGTERM-then-SIGKILL
//! escalation for the interrupt path (driven through `nix` instead of
//! shelling out to `kill`, since the crate already depends on it).

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::IterationResult;
use crate::domain::ports::AgentHandle;
use crate::infrastructure::agent::trace;

/// Grace period between SIGTERM and SIGKILL on interrupt.
const INTERRUPT_GRACE: Duration = Duration::from_secs(5);

pub struct ProcessAgentHandle {
    agent_id: String,
    child: Child,
    started: Instant,
}

impl ProcessAgentHandle {
    pub async fn spawn(binary: &str, args: &[String], working_dir: &str, prompt: &str, agent_id: &str) -> DomainResult<Self> {
        let mut child = Command::new(binary)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::AgentSpawnError {
                agent: agent_id.to_string(),
                source: e,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(prompt.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        Ok(Self {
            agent_id: agent_id.to_string(),
            child,
            started: Instant::now(),
        })
    }

    /// Builds the raw iteration result for the worker to classify. Agent
    /// handles don't decide rate-limit or completion-sentinel status
    /// themselves — `Worker::classify` does that from the raw
    /// output/error — this just reports process success/failure and
    /// extracts whatever subagent trace the combined output carries.
    fn classify_output(&self, stdout: String, stderr: String, success: bool) -> IterationResult {
        let combined = if stderr.is_empty() {
            stdout.clone()
        } else {
            format!("{stdout}\n{stderr}")
        };
        let elapsed = self.started.elapsed().as_millis() as u64;

        let mut result = if success {
            IterationResult::completed(stdout, elapsed, false)
        } else {
            let mut r = IterationResult::failed(stderr, elapsed);
            r.output = stdout;
            r
        };
        result.subagent_trace = trace::parse(&combined);
        result
    }
}

#[async_trait]
impl AgentHandle for ProcessAgentHandle {
    async fn wait(mut self: Box<Self>) -> DomainResult<IterationResult> {
        let output = self
            .child
            .wait_with_output()
            .await
            .map_err(|e| DomainError::AgentSpawnError {
                agent: self.agent_id.clone(),
                source: e,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Ok(self.classify_output(stdout, stderr, output.status.success()))
    }

    async fn interrupt(mut self: Box<Self>) -> DomainResult<IterationResult> {
        let elapsed = self.started.elapsed().as_millis() as u64;
        if let Some(pid) = self.child.id() {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if tokio::time::timeout(INTERRUPT_GRACE, self.child.wait()).await.is_err() {
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
            }
        } else {
            let _ = self.child.start_kill();
        }
        Ok(IterationResult::interrupted(elapsed))
    }
}
