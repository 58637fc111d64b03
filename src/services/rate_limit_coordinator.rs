//! Rate-limit coordinator. Tracks per-agent availability across an
//! ordered fallback chain and runs a cooperative recovery probe. Grounded
//! on `services/circuit_breaker.rs`'s `CircuitBreakerService`: an
//! `Arc<RwLock<HashMap<_, _>>>` of per-key state plus an optional
//! `tokio::sync::mpsc::Sender` that fires only on the edge of a state
//! transition, never on every call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::models::agent_state::{AgentAvailability, AgentState};

#[derive(Debug, Clone)]
pub enum RateLimitEvent {
    AgentLimited { agent: String },
    AgentAvailable { agent: String },
    AllLimited,
    AllRecovered { agent: String },
}

pub struct RateLimitCoordinator {
    chain: Vec<String>,
    agents: Arc<RwLock<HashMap<String, AgentState>>>,
    event_sender: Option<mpsc::Sender<RateLimitEvent>>,
    all_limited: Arc<RwLock<bool>>,
    probe_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimitCoordinator {
    pub fn new(chain: Vec<String>) -> Self {
        let mut agents = HashMap::new();
        for agent in &chain {
            agents.insert(agent.clone(), AgentState::default());
        }
        Self {
            chain,
            agents: Arc::new(RwLock::new(agents)),
            event_sender: None,
            all_limited: Arc::new(RwLock::new(false)),
            probe_handle: Mutex::new(None),
        }
    }

    pub fn with_event_sender(mut self, sender: mpsc::Sender<RateLimitEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    fn emit(&self, event: RateLimitEvent) {
        if let Some(ref sender) = self.event_sender {
            let _ = sender.try_send(event);
        }
    }

    /// Transitions `agent` to limited. Bumps `consecutiveLimitCount`. Emits
    /// `agent:limited` on the available→limited edge, and `all:limited`
    /// exactly once per epoch if this is the last agent in the chain to go
    /// limited.
    pub async fn mark_limited(&self, agent: &str, retry_after: Option<DateTime<Utc>>) {
        let mut agents = self.agents.write().await;
        let state = agents.entry(agent.to_string()).or_default();
        let was_available = state.status == AgentAvailability::Available;

        state.status = AgentAvailability::Limited;
        state.limited_at = Some(Utc::now());
        state.retry_after = retry_after;
        state.consecutive_limit_count += 1;

        if was_available {
            info!(agent, "agent marked rate-limited");
            self.emit(RateLimitEvent::AgentLimited {
                agent: agent.to_string(),
            });
        }

        let all_limited_now = agents.values().all(|s| !s.is_available());
        drop(agents);

        let mut flag = self.all_limited.write().await;
        if all_limited_now && !*flag {
            *flag = true;
            info!("entire fallback chain is rate-limited");
            self.emit(RateLimitEvent::AllLimited);
        }
    }

    /// Transitions `agent` to available, zeroing its counters. Emits
    /// `agent:available`, and `all:recovered(agent)` exactly once if the
    /// chain had been fully limited.
    pub async fn mark_available(&self, agent: &str) {
        let mut agents = self.agents.write().await;
        let state = agents.entry(agent.to_string()).or_default();
        let was_limited = state.status == AgentAvailability::Limited;

        state.status = AgentAvailability::Available;
        state.limited_at = None;
        state.retry_after = None;
        state.consecutive_limit_count = 0;
        drop(agents);

        if was_limited {
            debug!(agent, "agent marked available");
            self.emit(RateLimitEvent::AgentAvailable {
                agent: agent.to_string(),
            });
        }

        let mut flag = self.all_limited.write().await;
        if *flag {
            *flag = false;
            info!(agent, "fallback chain recovered");
            self.emit(RateLimitEvent::AllRecovered {
                agent: agent.to_string(),
            });
        }
    }

    pub async fn get_first_available(&self) -> Option<String> {
        let agents = self.agents.read().await;
        self.chain
            .iter()
            .find(|a| agents.get(*a).is_none_or(AgentState::is_available))
            .cloned()
    }

    /// Next-in-chain wrap-around available agent, skipping `current`.
    pub async fn get_available_fallback(&self, current: &str) -> Option<String> {
        let Some(pos) = self.chain.iter().position(|a| a == current) else {
            return self.get_first_available().await;
        };
        let agents = self.agents.read().await;
        let len = self.chain.len();
        for offset in 1..=len {
            let idx = (pos + offset) % len;
            let candidate = &self.chain[idx];
            if candidate == current {
                continue;
            }
            if agents.get(candidate).is_none_or(AgentState::is_available) {
                return Some(candidate.clone());
            }
        }
        None
    }

    pub async fn state_of(&self, agent: &str) -> Option<AgentState> {
        self.agents.read().await.get(agent).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, AgentState> {
        self.agents.read().await.clone()
    }

    /// Starts a cooperative periodic task that marks agents available once
    /// their `retryAfter` has elapsed. The probe never contacts the agent;
    /// confirmation is left to the next real attempt.
    pub async fn start_recovery_probe(self: &Arc<Self>, interval: std::time::Duration) {
        let mut handle = self.probe_handle.lock().await;
        if handle.is_some() {
            return;
        }
        let coordinator = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                let due: Vec<String> = {
                    let agents = coordinator.agents.read().await;
                    agents
                        .iter()
                        .filter(|(_, state)| {
                            !state.is_available() && state.retry_after.is_some_and(|t| t <= now)
                        })
                        .map(|(name, _)| name.clone())
                        .collect()
                };
                for agent in due {
                    coordinator.mark_available(&agent).await;
                }
            }
        }));
    }

    pub async fn stop_recovery_probe(&self) {
        if let Some(handle) = self.probe_handle.lock().await.take() {
            handle.abort();
        }
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Duration until `retry_after`, used by callers that need a concrete
    /// sleep instead of waiting on the probe's fixed tick interval.
    pub fn backoff_remaining(retry_after: DateTime<Utc>) -> Duration {
        (retry_after - Utc::now()).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_transition_to_limited_emits_agent_limited() {
        let (tx, mut rx) = mpsc::channel(8);
        let coordinator = RateLimitCoordinator::new(vec!["a".into(), "b".into()]).with_event_sender(tx);
        coordinator.mark_limited("a", None).await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, RateLimitEvent::AgentLimited { agent } if agent == "a"));
    }

    #[tokio::test]
    async fn all_limited_fires_once_until_recovery() {
        let (tx, mut rx) = mpsc::channel(8);
        let coordinator = RateLimitCoordinator::new(vec!["a".into(), "b".into()]).with_event_sender(tx);
        coordinator.mark_limited("a", None).await;
        coordinator.mark_limited("b", None).await;
        coordinator.mark_limited("b", None).await; // repeat: no extra all:limited

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let all_limited_count = events
            .iter()
            .filter(|e| matches!(e, RateLimitEvent::AllLimited))
            .count();
        assert_eq!(all_limited_count, 1);
    }

    #[tokio::test]
    async fn recovery_emits_all_recovered_exactly_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let coordinator = RateLimitCoordinator::new(vec!["a".into(), "b".into()]).with_event_sender(tx);
        coordinator.mark_limited("a", None).await;
        coordinator.mark_limited("b", None).await;
        coordinator.mark_available("a").await;

        let mut saw_all_recovered = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, RateLimitEvent::AllRecovered { .. }) {
                saw_all_recovered += 1;
            }
        }
        assert_eq!(saw_all_recovered, 1);
    }

    #[tokio::test]
    async fn get_available_fallback_wraps_around_skipping_current() {
        let coordinator = RateLimitCoordinator::new(vec!["a".into(), "b".into(), "c".into()]);
        coordinator.mark_limited("b", None).await;
        assert_eq!(coordinator.get_available_fallback("a").await, Some("c".to_string()));
        assert_eq!(coordinator.get_available_fallback("c").await, Some("a".to_string()));
    }

    #[tokio::test]
    async fn get_first_available_returns_first_chain_entry_not_limited() {
        let coordinator = RateLimitCoordinator::new(vec!["a".into(), "b".into()]);
        coordinator.mark_limited("a", None).await;
        assert_eq!(coordinator.get_first_available().await, Some("b".to_string()));
    }
}
