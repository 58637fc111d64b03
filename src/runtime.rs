//! Assembles the coordination core's components from a loaded [`Config`]
//! into one running pool: scheduler, rate-limit coordinator, working-copy
//! manager, dispatcher, merge refinery, and the pool-refinery bridge that
//! wires worker completions to merge requests and back. Shared by the
//! `run` and `resume` CLI commands so both start from the same assembly.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::config::Config;
use crate::domain::models::{
    PersistedAgentRateLimit, PersistedWorkerState, PoolSnapshot, SessionSnapshot, SessionStatus, TaskFilter,
};
use crate::domain::ports::Tracker;
use crate::infrastructure::agent::ProcessAgentFactory;
use crate::infrastructure::git::GitRunner;
use crate::infrastructure::tracker::{CliTracker, CliTrackerConfig, JsonTracker};
use crate::services::conflict_resolver::{ConflictResolver, ConflictResolverConfig};
use crate::services::dispatcher::{Dispatcher, DispatcherConfig};
use crate::services::merge_queue::MergeQueue;
use crate::services::merger::{Merger, MergerConfig};
use crate::services::pool_refinery::PoolRefineryBridge;
use crate::services::rate_limit_coordinator::RateLimitCoordinator;
use crate::services::refinery::{Refinery, RefineryConfig};
use crate::services::session_store::SessionStore;
use crate::services::working_copy_manager::WorkingCopyManager;

pub const DEFAULT_REMOTE: &str = "origin";

/// The assembled set of long-lived handles a running session needs. Held
/// by the CLI command for the duration of `run`/`resume`.
pub struct Session {
    pub dispatcher: Arc<Dispatcher>,
    pub refinery: Arc<Refinery>,
    pub merge_queue: Arc<MergeQueue>,
    pub rate_limits: Arc<RateLimitCoordinator>,
    pub tracker: Arc<dyn Tracker>,
    pub store: Arc<SessionStore>,
    pub session_id: String,
}

/// Which tracker backend to use. A `bd`/`bv`-backed tracker when the
/// operator has those CLIs installed, otherwise a local JSON file.
pub enum TrackerBackend {
    Json { path: String },
    Cli(CliTrackerConfig),
}

pub struct BuildOptions {
    pub repo_root: String,
    pub tracker: TrackerBackend,
}

/// Builds every component and starts the dispatcher's tick loop, the
/// refinery's event listeners, and the pool-refinery bridge. Does not
/// touch the session store — callers decide whether this is a fresh
/// session or a resumed one.
pub async fn build(config: &Config, opts: BuildOptions) -> DomainResult<Session> {
    let tracker: Arc<dyn Tracker> = match opts.tracker {
        TrackerBackend::Json { path } => Arc::new(JsonTracker::new(path)),
        TrackerBackend::Cli(cfg) => Arc::new(CliTracker::new(cfg)),
    };

    let working_copies = Arc::new(WorkingCopyManager::new(
        opts.repo_root.clone(),
        config.pool.worktree_dir.clone(),
    ));
    working_copies.reconcile().await?;

    let fallback_chain: Vec<String> = std::iter::once(config.agents_section.primary.clone())
        .chain(config.agents_section.fallback.iter().cloned())
        .collect();
    let (rate_limit_tx, mut rate_limit_rx) = mpsc::channel(256);
    let rate_limits = Arc::new(
        RateLimitCoordinator::new(fallback_chain.clone()).with_event_sender(rate_limit_tx),
    );

    let agent_factory = Arc::new(ProcessAgentFactory::new());

    let (dispatcher_tx, mut dispatcher_rx) = mpsc::channel(256);
    let (dispatcher, worker_events) = Dispatcher::new(
        Arc::clone(&tracker),
        Arc::clone(&working_copies),
        Arc::clone(&rate_limits),
        agent_factory,
        DispatcherConfig {
            max_workers: config.resolved_max_workers(),
            strict_dependencies: config.pool.scheduling.strict_dependencies,
            primary_agent: config.agents_section.primary.clone(),
            fallback_chain: fallback_chain.clone(),
            model: None,
            error_strategy: config.error_handling.strategy,
            tick_interval_ms: 1_000,
            output_dir: config.output_dir.clone(),
        },
        DEFAULT_REMOTE,
        Some(dispatcher_tx),
    );

    let git = GitRunner::new(opts.repo_root.clone());
    let merger = Arc::new(Merger::new(
        git,
        DEFAULT_REMOTE,
        MergerConfig {
            target_branch: config.refinery.target_branch.clone(),
            run_tests: config.refinery.run_tests,
            test_command: config.refinery.test_command.clone(),
            retry_flaky_tests: config.refinery.retry_flaky_tests,
            delete_after_merge: config.refinery.delete_after_merge,
        },
    ));

    let resolver = Arc::new(ConflictResolver::new(
        ConflictResolverConfig {
            max_rebase_attempts: config.refinery.max_rebase_attempts,
            default_strategy: config.refinery.on_conflict,
            target_branch: config.refinery.target_branch.clone(),
        },
        Some(Arc::clone(&dispatcher) as Arc<dyn crate::services::conflict_resolver::RebaseExecutor>),
    ));

    let merge_queue = Arc::new(MergeQueue::new());
    let (refinery_tx, refinery_rx) = mpsc::channel(256);
    let refinery = Arc::new(
        Refinery::new(
            Arc::clone(&merge_queue),
            merger,
            resolver,
            RefineryConfig {
                max_retries: config.error_handling.max_retries,
            },
        )
        .with_event_sender(refinery_tx),
    );

    let bridge = PoolRefineryBridge::new(Arc::clone(&dispatcher), Arc::clone(&refinery), Arc::clone(&tracker), None);
    bridge.spawn(worker_events, refinery_rx);

    dispatcher.start().await;

    // Rate-limit edges pause/resume the whole pool; drain both side
    // channels so pending events don't back up the bounded mpsc queues.
    let dispatcher_for_rl = Arc::clone(&dispatcher);
    tokio::spawn(async move {
        while let Some(event) = rate_limit_rx.recv().await {
            crate::services::dispatcher::handle_rate_limit_event(&dispatcher_for_rl, event).await;
        }
    });
    tokio::spawn(async move { while dispatcher_rx.recv().await.is_some() {} });

    let session_id = uuid::Uuid::new_v4().to_string();
    let store = Arc::new(SessionStore::new(config.session.path.clone()));

    Ok(Session {
        dispatcher,
        refinery,
        merge_queue,
        rate_limits,
        tracker,
        store,
        session_id,
    })
}

impl Session {
    /// Builds a fresh snapshot from the current live state of every
    /// component, for the periodic persistence task in the `run`/`resume`
    /// command loops.
    pub async fn snapshot(&self, config: &Config) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::new_v2(self.session_id.clone(), "parallel".to_string(), {
            if config.max_iterations == 0 {
                None
            } else {
                Some(config.max_iterations)
            }
        });

        let mut workers = BTreeMap::new();
        let mut active_task_ids = std::collections::BTreeSet::new();
        let mut iteration_total: u32 = 0;
        for record in self.dispatcher.worker_records().await {
            if let Some(ref task_id) = record.task_id {
                active_task_ids.insert(task_id.clone());
            }
            iteration_total = iteration_total.saturating_add(record.iteration);
            workers.insert(
                record.name.clone(),
                PersistedWorkerState {
                    task_id: record.task_id,
                    iteration: record.iteration,
                    status: record.status,
                    agent_id: record.agent_id,
                    worktree_path: record.working_copy_path,
                    branch: record.branch,
                    error: record.error,
                },
            );
        }
        snapshot.iteration = iteration_total;

        let mut rate_limits = BTreeMap::new();
        for (agent, state) in self.rate_limits.snapshot().await {
            rate_limits.insert(
                agent,
                PersistedAgentRateLimit {
                    limited: !state.is_available(),
                    limited_at: state.limited_at,
                    retry_after: state.retry_after,
                    consecutive_limit_count: state.consecutive_limit_count,
                },
            );
        }

        snapshot.pool = Some(PoolSnapshot {
            workers,
            merge_queue: self.merge_queue.list().await,
            completed_tasks: std::collections::BTreeSet::new(),
            conflict_tasks: std::collections::BTreeSet::new(),
            rate_limits,
            max_workers: config.resolved_max_workers(),
            fallback_chain: self.rate_limits.chain().to_vec(),
            active_task_ids,
        });

        snapshot
    }

    /// True once there's no live worker, nothing queued to merge, and the
    /// tracker reports no schedulable task left anywhere — the natural end
    /// of a `run`/`resume` session rather than an operator-driven stop.
    pub async fn is_idle(&self) -> bool {
        if !self.dispatcher.worker_records().await.is_empty() {
            return false;
        }
        if !self.merge_queue.list().await.is_empty() {
            return false;
        }
        let remaining = self
            .tracker
            .get_tasks(&TaskFilter {
                statuses: vec![
                    crate::domain::models::TaskStatus::Open,
                    crate::domain::models::TaskStatus::InProgress,
                ],
                ..Default::default()
            })
            .await
            .unwrap_or_default();
        remaining.is_empty()
    }

    /// Persists one snapshot. Failures are logged, never fatal — the
    /// dispatcher keeps running even if the session file is momentarily
    /// unwritable.
    pub async fn persist(&self, config: &Config) -> SessionSnapshot {
        let snapshot = self.snapshot(config).await;
        if let Err(e) = self.store.save(&snapshot).await {
            warn!(error = %e, "failed to persist session snapshot");
        }
        snapshot
    }

    /// Stops the dispatcher and refinery, then writes a final snapshot
    /// marked as cleanly stopped.
    pub async fn shutdown(&self, config: &Config, status: SessionStatus) {
        self.refinery.stop();
        self.dispatcher.stop().await;
        let mut snapshot = self.snapshot(config).await;
        snapshot.mark_stopped(status);
        if let Err(e) = self.store.save(&snapshot).await {
            warn!(error = %e, "failed to persist final session snapshot");
        }
        if let Err(e) = self.store.release_lock().await {
            warn!(error = %e, "failed to release session lock");
        }
        info!(status = ?status, "session stopped");
    }
}

/// Default tracker backend when the config doesn't ask for the `bd`/`bv`
/// CLIs: a JSON file alongside the rest of the runtime's output.
pub fn default_tracker_backend(config: &Config) -> TrackerBackend {
    TrackerBackend::Json {
        path: format!("{}/tasks.json", config.output_dir),
    }
}
