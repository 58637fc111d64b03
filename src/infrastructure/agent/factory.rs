//! Builds [`Agent`] capabilities for the dispatcher. One [`ProcessAgent`]
//! per configured agent id (primary plus fallback chain); the binary name
//! defaults to the agent id itself, since none of the supported agent
//! CLIs have a native Rust binding in the dependency stack — overridable
//! per-id for installs that rename the binary.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::errors::DomainResult;
use crate::domain::ports::Agent;
use crate::infrastructure::agent::runner::{ProcessAgent, ProcessAgentConfig};
use crate::services::dispatcher::AgentFactory;

/// Maps an agent id to the CLI binary/version-flag invocation that runs it.
#[derive(Debug, Clone)]
pub struct ProcessAgentFactory {
    binaries: HashMap<String, String>,
    version_flag: String,
    base_args: Vec<String>,
}

impl ProcessAgentFactory {
    pub fn new() -> Self {
        Self {
            binaries: HashMap::new(),
            version_flag: "--version".to_string(),
            base_args: Vec::new(),
        }
    }

    /// Registers a binary name different from the agent id (e.g. `claude`
    /// id backed by a `claude-code` executable).
    pub fn with_binary(mut self, agent_id: impl Into<String>, binary: impl Into<String>) -> Self {
        self.binaries.insert(agent_id.into(), binary.into());
        self
    }

    fn binary_for(&self, agent_id: &str) -> String {
        self.binaries
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| agent_id.to_string())
    }
}

impl Default for ProcessAgentFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentFactory for ProcessAgentFactory {
    async fn build(&self, agent_id: &str) -> DomainResult<Box<dyn Agent>> {
        let binary = self.binary_for(agent_id);
        debug!(agent_id, binary, "instantiating process agent");
        Ok(Box::new(ProcessAgent::new(ProcessAgentConfig {
            id: agent_id.to_string(),
            binary,
            base_args: self.base_args.clone(),
            version_flag: self.version_flag.clone(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_binary_name_to_agent_id() {
        let factory = ProcessAgentFactory::new();
        let agent = factory.build("claude").await.unwrap();
        assert_eq!(agent.metadata().id, "claude");
    }

    #[tokio::test]
    async fn honors_a_registered_binary_override() {
        let factory = ProcessAgentFactory::new().with_binary("claude", "claude-code");
        assert_eq!(factory.binary_for("claude"), "claude-code");
        let agent = factory.build("claude").await.unwrap();
        assert_eq!(agent.metadata().id, "claude");
    }
}
