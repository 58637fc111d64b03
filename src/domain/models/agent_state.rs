//! Per-agent rate-limit state owned by the rate-limit coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAvailability {
    Available,
    Limited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub status: AgentAvailability,
    pub limited_at: Option<DateTime<Utc>>,
    pub retry_after: Option<DateTime<Utc>>,
    pub consecutive_limit_count: u32,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            status: AgentAvailability::Available,
            limited_at: None,
            retry_after: None,
            consecutive_limit_count: 0,
        }
    }
}

impl AgentState {
    pub fn is_available(&self) -> bool {
        self.status == AgentAvailability::Available
    }
}
