//! Subprocess-backed `Agent` implementation. One `ProcessAgent` per
//! configured agent id (e.g. `claude`, `codex`), each launching its own
//! binary with a fixed argument template plus the worker's
//! `--model`/working-directory overrides for that iteration.

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::errors::DomainResult;
use crate::domain::models::IterationResult;
use crate::domain::ports::{Agent, AgentDetection, AgentHandle, AgentMetadata, ExecutionOptions};
use crate::infrastructure::agent::process::ProcessAgentHandle;

/// Static description of how to invoke one agent CLI.
#[derive(Debug, Clone)]
pub struct ProcessAgentConfig {
    pub id: String,
    pub binary: String,
    pub base_args: Vec<String>,
    pub version_flag: String,
}

pub struct ProcessAgent {
    config: ProcessAgentConfig,
}

impl ProcessAgent {
    pub fn new(config: ProcessAgentConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Agent for ProcessAgent {
    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            id: self.config.id.clone(),
            supports_streaming: true,
            supports_interrupt: true,
            supports_subagent_tracing: true,
            structured_output_format: Some("ndjson".to_string()),
        }
    }

    async fn initialize(&mut self) -> DomainResult<()> {
        Ok(())
    }

    async fn detect(&self) -> DomainResult<AgentDetection> {
        let output = Command::new(&self.config.binary)
            .arg(&self.config.version_flag)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => Ok(AgentDetection {
                available: true,
                version: Some(String::from_utf8_lossy(&out.stdout).trim().to_string()),
                error: None,
            }),
            Ok(out) => Ok(AgentDetection {
                available: false,
                version: None,
                error: Some(String::from_utf8_lossy(&out.stderr).trim().to_string()),
            }),
            Err(e) => Ok(AgentDetection {
                available: false,
                version: None,
                error: Some(e.to_string()),
            }),
        }
    }

    async fn execute(
        &self,
        prompt: &str,
        files: &[String],
        options: ExecutionOptions,
    ) -> DomainResult<Box<dyn AgentHandle>> {
        let mut args = self.config.base_args.clone();
        args.extend(options.extra_args);
        args.extend(files.iter().cloned());

        let handle = ProcessAgentHandle::spawn(
            &self.config.binary,
            &args,
            &options.working_dir,
            prompt,
            &self.config.id,
        )
        .await?;

        Ok(Box::new(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detect_reports_unavailable_for_a_missing_binary() {
        let agent = ProcessAgent::new(ProcessAgentConfig {
            id: "nonexistent-agent-cli".to_string(),
            binary: "definitely-not-a-real-binary-xyz".to_string(),
            base_args: Vec::new(),
            version_flag: "--version".to_string(),
        });
        let detection = agent.detect().await.unwrap();
        assert!(!detection.available);
    }

    #[tokio::test]
    async fn execute_runs_a_real_process_and_captures_stdout() {
        let agent = ProcessAgent::new(ProcessAgentConfig {
            id: "echo".to_string(),
            binary: "echo".to_string(),
            base_args: vec!["hello from agent".to_string()],
            version_flag: "--version".to_string(),
        });
        let options = ExecutionOptions {
            working_dir: ".".to_string(),
            timeout_ms: None,
            extra_args: Vec::new(),
        };
        let handle = agent.execute("ignored prompt", &[], options).await.unwrap();
        let result: IterationResult = handle.wait().await.unwrap();
        assert!(result.output.contains("hello from agent"));
    }
}
