//! Subprocess-backed coding-agent adapters implementing the domain's
//! `Agent`/`AgentHandle` ports. Grounded on
//! `application/mcp_process_manager.rs`'s child-process lifecycle and
//! `cli/service/swarm_service.rs`'s SIGTERM/SIGKILL escalation.

pub mod factory;
pub mod process;
pub mod runner;
pub mod trace;

pub use factory::ProcessAgentFactory;
pub use runner::{ProcessAgent, ProcessAgentConfig};
