//! Domain ports: trait boundaries the services depend on, implemented by
//! `infrastructure`.

pub mod agent;
pub mod tracker;

pub use agent::{Agent, AgentDetection, AgentHandle, AgentMetadata, ExecutionOptions};
pub use tracker::Tracker;
