//! Agent capability port. Generalized from
//! `application/mcp_process_manager.rs`'s child-process lifecycle: where
//! that module owned two fixed MCP server children, this port abstracts
//! over any number of coding-agent subprocesses started per worker
//! iteration, each exposing graceful-then-forceful interruption.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::IterationResult;

/// Static capability description an agent implementation reports at
/// startup.
#[derive(Debug, Clone)]
pub struct AgentMetadata {
    pub id: String,
    pub supports_streaming: bool,
    pub supports_interrupt: bool,
    pub supports_subagent_tracing: bool,
    pub structured_output_format: Option<String>,
}

/// Outcome of probing whether an agent binary/credential is usable.
#[derive(Debug, Clone)]
pub struct AgentDetection {
    pub available: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

/// Per-invocation options passed to [`Agent::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub working_dir: String,
    pub timeout_ms: Option<u64>,
    pub extra_args: Vec<String>,
}

/// A handle to an in-flight agent invocation. Mirrors the
/// spawn-then-wait-or-interrupt shape `McpProcessManager` used for its
/// fixed server children, generalized to one handle per iteration.
#[async_trait]
pub trait AgentHandle: Send {
    /// Blocks until the subprocess exits naturally and returns the parsed
    /// result.
    async fn wait(self: Box<Self>) -> DomainResult<IterationResult>;

    /// Graceful-then-forceful interruption: sends the agent's stop signal,
    /// waits up to a fixed escalation delay, then force-kills.
    async fn interrupt(self: Box<Self>) -> DomainResult<IterationResult>;
}

/// The coding-agent capability consumed by the worker.
#[async_trait]
pub trait Agent: Send + Sync {
    fn metadata(&self) -> AgentMetadata;

    /// One-time setup (credentials, binary discovery) before first use.
    async fn initialize(&mut self) -> DomainResult<()>;

    /// Probes whether the agent is currently usable.
    async fn detect(&self) -> DomainResult<AgentDetection>;

    /// Starts one iteration. The prompt is delivered over stdin when
    /// [`AgentMetadata::supports_streaming`] indicates stdin intake;
    /// returns immediately with a handle rather than blocking on exit.
    async fn execute(
        &self,
        prompt: &str,
        files: &[String],
        options: ExecutionOptions,
    ) -> DomainResult<Box<dyn AgentHandle>>;
}
