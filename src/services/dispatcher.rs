//! Worker pool dispatcher. The main control loop: ticks roughly once a
//! second, asks the scheduler for ready tasks, spawns a worker per task up
//! to `maxWorkers`, and reacts to rate-limit coordinator events by
//! pausing/resuming the whole pool. Grounded on `services/swarm_orchestrator/
//! mod.rs`'s shape (a live-worker set plus a periodic tick task) scaled down
//! to this spec's single dispatcher and simplified from a multi-phase
//! orchestrator to a flat tick loop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::config::ErrorStrategy;
use crate::domain::models::{Task, WorkerRecord, WorkerStatus};
use crate::domain::ports::{Agent, Tracker};
use crate::infrastructure::session::IterationLogWriter;
use crate::services::conflict_resolver::RebaseExecutor;
use crate::services::name_pool::NamePool;
use crate::services::rate_limit_coordinator::{RateLimitCoordinator, RateLimitEvent};
use crate::services::scheduler::{Scheduler, SchedulerConfig};
use crate::services::worker::{Worker, WorkerController, WorkerEvent};
use crate::services::working_copy_manager::WorkingCopyManager;
use crate::infrastructure::git::GitRunner;

/// Builds an [`Agent`] capability for a given agent id. Implemented by the
/// infrastructure layer so the dispatcher never depends on a concrete agent
/// CLI binding.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn build(&self, agent_id: &str) -> DomainResult<Box<dyn Agent>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherStatus {
    Running,
    Paused,
    AllLimited,
    Stopped,
}

#[derive(Debug, Clone)]
pub enum DispatcherEvent {
    WorkerSpawned { worker: String, task_id: String },
    WorkerCompleted { worker: String, task_id: String },
    WorkerRemoved { worker: String },
    StatusChanged { status: DispatcherStatus },
}

pub struct DispatcherConfig {
    pub max_workers: u32,
    pub strict_dependencies: bool,
    pub primary_agent: String,
    pub fallback_chain: Vec<String>,
    pub model: Option<String>,
    pub error_strategy: ErrorStrategy,
    pub tick_interval_ms: u64,
    pub output_dir: String,
}

struct WorkerSlot {
    controller: WorkerController,
    record: Arc<RwLock<WorkerRecord>>,
    task_handle: JoinHandle<()>,
}

pub struct Dispatcher {
    tracker: Arc<dyn Tracker>,
    scheduler: Mutex<Scheduler>,
    name_pool: Mutex<NamePool>,
    working_copies: Arc<WorkingCopyManager>,
    rate_limits: Arc<RateLimitCoordinator>,
    agent_factory: Arc<dyn AgentFactory>,
    slots: RwLock<HashMap<String, WorkerSlot>>,
    iteration_log: Arc<IterationLogWriter>,
    config: DispatcherConfig,
    event_sender: Option<mpsc::Sender<DispatcherEvent>>,
    worker_event_sender: mpsc::Sender<WorkerEvent>,
    status: RwLock<DispatcherStatus>,
    tick_handle: Mutex<Option<JoinHandle<()>>>,
    remote: String,
}

impl Dispatcher {
    pub fn new(
        tracker: Arc<dyn Tracker>,
        working_copies: Arc<WorkingCopyManager>,
        rate_limits: Arc<RateLimitCoordinator>,
        agent_factory: Arc<dyn AgentFactory>,
        config: DispatcherConfig,
        remote: impl Into<String>,
        event_sender: Option<mpsc::Sender<DispatcherEvent>>,
    ) -> (Arc<Self>, mpsc::Receiver<WorkerEvent>) {
        let (worker_event_sender, worker_event_receiver) = mpsc::channel(256);
        let scheduler = Scheduler::new(
            Arc::clone(&tracker),
            SchedulerConfig {
                max_workers: config.max_workers,
                strict_dependencies: config.strict_dependencies,
            },
        );
        let iteration_log = Arc::new(IterationLogWriter::new(&config.output_dir));
        let dispatcher = Arc::new(Self {
            tracker,
            scheduler: Mutex::new(scheduler),
            name_pool: Mutex::new(NamePool::new()),
            working_copies,
            rate_limits,
            agent_factory,
            slots: RwLock::new(HashMap::new()),
            iteration_log,
            config,
            event_sender,
            worker_event_sender,
            status: RwLock::new(DispatcherStatus::Running),
            tick_handle: Mutex::new(None),
            remote: remote.into(),
        });
        (dispatcher, worker_event_receiver)
    }

    fn emit(&self, event: DispatcherEvent) {
        if let Some(ref sender) = self.event_sender {
            let _ = sender.try_send(event);
        }
    }

    pub async fn status(&self) -> DispatcherStatus {
        *self.status.read().await
    }

    async fn set_status(&self, status: DispatcherStatus) {
        let mut current = self.status.write().await;
        if *current != status {
            *current = status;
            info!(?status, "dispatcher status changed");
            self.emit(DispatcherEvent::StatusChanged { status });
        }
    }

    /// Starts the ~1s tick loop and the rate-limit coordinator's recovery
    /// probe.
    pub async fn start(self: &Arc<Self>) {
        self.set_status(DispatcherStatus::Running).await;
        self.rate_limits
            .start_recovery_probe(std::time::Duration::from_secs(30))
            .await;

        let dispatcher = Arc::clone(self);
        let interval = std::time::Duration::from_millis(self.config.tick_interval_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if dispatcher.status().await == DispatcherStatus::Stopped {
                    break;
                }
                dispatcher.tick().await;
            }
        });
        *self.tick_handle.lock().await = Some(handle);
    }

    /// One control-loop pass: spawns workers for ready tasks until
    /// `maxWorkers` or the ready queue is exhausted. No-op while paused or
    /// fully rate-limited.
    pub async fn tick(self: &Arc<Self>) {
        let status = self.status().await;
        if matches!(status, DispatcherStatus::Paused | DispatcherStatus::AllLimited | DispatcherStatus::Stopped) {
            return;
        }

        let ready: Vec<Task> = {
            let scheduler = self.scheduler.lock().await;
            if !scheduler.can_assign_more() {
                return;
            }
            let assignments = match scheduler.get_ready_tasks().await {
                Ok(a) => a,
                Err(e) => {
                    warn!(error = %e, "failed to compute ready tasks");
                    return;
                }
            };
            let mut tasks = Vec::new();
            for assignment in assignments {
                if let Ok(Some(task)) = self.tracker.get_task(&assignment.task_id).await {
                    tasks.push(task);
                }
            }
            tasks
        };

        for task in ready {
            let can_assign = self.scheduler.lock().await.can_assign_more();
            if !can_assign {
                break;
            }
            if let Err(e) = self.spawn_worker_for_task(&task).await {
                warn!(task_id = %task.id, error = %e, "failed to spawn worker for task");
            }
        }
    }

    async fn spawn_worker_for_task(self: &Arc<Self>, task: &Task) -> DomainResult<()> {
        let name = self.name_pool.lock().await.acquire();
        let working_copy = self.working_copies.create(&name, &task.id, None).await?;

        let agent_id = self
            .rate_limits
            .get_first_available()
            .await
            .unwrap_or_else(|| self.config.primary_agent.clone());
        let agent = self.agent_factory.build(&agent_id).await?;

        let mut worker = Worker::new(
            name.clone(),
            working_copy,
            agent,
            Arc::clone(&self.tracker),
            self.config.model.clone(),
        )
        .with_event_sender(self.worker_event_sender.clone())
        .with_iteration_log(Arc::clone(&self.iteration_log));
        worker.assign_task(task).await?;

        self.scheduler.lock().await.assign_task(&task.id, &name)?;

        let controller = worker.controller();
        let record = Arc::new(RwLock::new(worker.record().clone()));

        let dispatcher = Arc::clone(self);
        let record_for_task = Arc::clone(&record);
        let task_for_loop = task.clone();
        let name_for_loop = name.clone();
        let task_handle = tokio::spawn(async move {
            dispatcher
                .run_worker_loop(worker, task_for_loop, name_for_loop, record_for_task)
                .await;
        });

        self.slots.write().await.insert(
            name.clone(),
            WorkerSlot {
                controller,
                record,
                task_handle,
            },
        );

        self.emit(DispatcherEvent::WorkerSpawned {
            worker: name,
            task_id: task.id.clone(),
        });
        Ok(())
    }

    /// Drives one worker through repeated iterations until it reaches a
    /// terminal status, switching to a fallback agent on rate-limit rather
    /// than giving up immediately.
    async fn run_worker_loop(
        self: Arc<Self>,
        mut worker: Worker,
        task: Task,
        name: String,
        record: Arc<RwLock<WorkerRecord>>,
    ) {
        loop {
            let iteration = match worker.execute_iteration(&task).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(worker = %name, error = %e, "iteration failed");
                    break;
                }
            };
            *record.write().await = worker.record().clone();

            match worker.record().status {
                WorkerStatus::RateLimited => {
                    let retry_after = iteration
                        .rate_limit
                        .as_ref()
                        .and_then(|info| info.retry_after_seconds)
                        .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64));
                    self.rate_limits.mark_limited(&worker.record().agent_id, retry_after).await;
                    match self.rate_limits.get_available_fallback(&worker.record().agent_id).await {
                        Some(fallback) => {
                            if let Ok(agent) = self.agent_factory.build(&fallback).await {
                                info!(worker = %name, %fallback, "switching to fallback agent after rate limit");
                                worker.switch_agent(agent);
                                continue;
                            }
                        }
                        None => {
                            self.update_status_after_limit_change().await;
                            break;
                        }
                    }
                    break;
                }
                WorkerStatus::Done => {
                    self.emit(DispatcherEvent::WorkerCompleted {
                        worker: name.clone(),
                        task_id: task.id.clone(),
                    });
                    break;
                }
                WorkerStatus::Error => {
                    if self.config.error_strategy == ErrorStrategy::Retry {
                        worker.resume();
                        continue;
                    }
                    break;
                }
                WorkerStatus::Interrupted => break,
                WorkerStatus::Working | WorkerStatus::Idle => {}
            }
        }
    }

    async fn update_status_after_limit_change(&self) {
        if self.rate_limits.get_first_available().await.is_none() {
            self.set_status(DispatcherStatus::AllLimited).await;
        }
    }

    /// Releases a worker's resources once its task has been merged (or
    /// permanently abandoned): frees the working copy, its branch, the
    /// worker name, and the scheduler's assignment.
    pub async fn release_worker(&self, name: &str, task_id: &str, delete_branch: bool) -> DomainResult<()> {
        if let Some(slot) = self.slots.write().await.remove(name) {
            slot.task_handle.abort();
        }
        self.working_copies.remove(name, delete_branch).await?;
        self.name_pool.lock().await.release(name);
        self.scheduler.lock().await.mark_merged(task_id);
        self.emit(DispatcherEvent::WorkerRemoved {
            worker: name.to_string(),
        });
        Ok(())
    }

    pub async fn worker_records(&self) -> Vec<WorkerRecord> {
        let slots = self.slots.read().await;
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots.values() {
            records.push(slot.record.read().await.clone());
        }
        records
    }

    pub async fn pause(&self) {
        self.set_status(DispatcherStatus::Paused).await;
        for slot in self.slots.read().await.values() {
            let mut record = slot.record.write().await;
            record.paused = true;
        }
    }

    pub async fn resume(&self) {
        self.set_status(DispatcherStatus::Running).await;
        for slot in self.slots.read().await.values() {
            let mut record = slot.record.write().await;
            record.paused = false;
        }
    }

    /// Stops the tick loop, interrupts every live worker, and removes its
    /// working copy — the clean-stop half of OQ2 (a crash instead leaves
    /// the working copy behind for `session_store::detect_and_recover`).
    pub async fn stop(&self) {
        self.set_status(DispatcherStatus::Stopped).await;
        if let Some(handle) = self.tick_handle.lock().await.take() {
            handle.abort();
        }
        self.rate_limits.stop_recovery_probe().await;

        let names: Vec<String> = {
            let slots = self.slots.read().await;
            for slot in slots.values() {
                slot.controller.stop();
            }
            slots.keys().cloned().collect()
        };
        for name in names {
            if let Some(slot) = self.slots.write().await.remove(&name) {
                slot.task_handle.abort();
            }
            let _ = self.working_copies.remove(&name, true).await;
        }
    }
}

/// Drives the rebase-and-force-push sequence the conflict resolver asks
/// for: fetch, rebase the conflicted branch onto the target, push with
/// lease. Runs directly against the branch's own working-copy checkout so
/// the rebase never touches the refinery's own target checkout.
#[async_trait]
impl RebaseExecutor for Dispatcher {
    async fn rebase(&self, branch: &str, target: &str) -> DomainResult<bool> {
        let Some(working_copy) = self
            .working_copies
            .list()
            .await
            .into_iter()
            .find(|wc| wc.branch == branch)
        else {
            warn!(branch, "no working copy found for branch, cannot rebase");
            return Ok(false);
        };

        let git = GitRunner::new(working_copy.path.clone());
        git.fetch(&self.remote).await?;
        let rebase_target = format!("{}/{}", self.remote, target);
        let out = git.rebase_onto(&rebase_target).await?;
        if !out.success {
            git.rebase_abort().await?;
            return Ok(false);
        }

        let push = git.push_force_with_lease(&self.remote, branch).await?;
        Ok(push.success)
    }
}

/// Reacts to rate-limit coordinator edges by pausing/resuming the pool as a
/// whole. Called from the wiring code that owns both the dispatcher and the
/// coordinator's event receiver.
pub async fn handle_rate_limit_event(dispatcher: &Arc<Dispatcher>, event: RateLimitEvent) {
    match event {
        RateLimitEvent::AllLimited => dispatcher.set_status(DispatcherStatus::AllLimited).await,
        RateLimitEvent::AllRecovered { .. } => {
            if dispatcher.status().await == DispatcherStatus::AllLimited {
                dispatcher.set_status(DispatcherStatus::Running).await;
            }
        }
        RateLimitEvent::AgentLimited { .. } | RateLimitEvent::AgentAvailable { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainResult as Res;
    use crate::domain::models::{CompleteTaskOutcome, Epic, TaskFilter, TaskStatus};
    use tempfile::TempDir;
    use tokio::process::Command;

    struct EmptyTracker;

    #[async_trait]
    impl Tracker for EmptyTracker {
        async fn get_tasks(&self, _filter: &TaskFilter) -> Res<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn get_task(&self, _id: &str) -> Res<Option<Task>> {
            Ok(None)
        }
        async fn get_next_task(&self, _filter: &TaskFilter) -> Res<Option<Task>> {
            Ok(None)
        }
        async fn update_task_status(&self, _id: &str, _status: TaskStatus) -> Res<Option<Task>> {
            Ok(None)
        }
        async fn complete_task(&self, _id: &str, _reason: Option<&str>) -> Res<CompleteTaskOutcome> {
            Ok(CompleteTaskOutcome {
                success: true,
                task: None,
                message: String::new(),
                error: None,
            })
        }
        async fn get_epics(&self) -> Res<Vec<Epic>> {
            Ok(Vec::new())
        }
    }

    struct NoAgentsFactory;

    #[async_trait]
    impl AgentFactory for NoAgentsFactory {
        async fn build(&self, agent_id: &str) -> DomainResult<Box<dyn Agent>> {
            Err(crate::domain::errors::DomainError::GitError(format!(
                "no agent binding available in tests for {agent_id}"
            )))
        }
    }

    async fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let path = dir.path();
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "t@example.com"],
            vec!["config", "user.name", "tester"],
        ] {
            Command::new("git").current_dir(path).args(args).output().await.unwrap();
        }
        tokio::fs::write(path.join("README.md"), "hi").await.unwrap();
        Command::new("git").current_dir(path).args(["add", "."]).output().await.unwrap();
        Command::new("git")
            .current_dir(path)
            .args(["commit", "-q", "-m", "init"])
            .output()
            .await
            .unwrap();
        dir
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            max_workers: 2,
            strict_dependencies: true,
            primary_agent: "claude".to_string(),
            fallback_chain: vec!["claude".to_string()],
            model: None,
            error_strategy: ErrorStrategy::Retry,
            tick_interval_ms: 1000,
            output_dir: ".ralph-tui".to_string(),
        }
    }

    #[tokio::test]
    async fn starts_running_and_toggles_on_pause_resume() {
        let repo = init_repo().await;
        let working_copies = Arc::new(WorkingCopyManager::new(
            repo.path().to_string_lossy().to_string(),
            repo.path().join(".ralph-workers"),
        ));
        let rate_limits = Arc::new(RateLimitCoordinator::new(vec!["claude".to_string()]));
        let (dispatcher, _worker_events) = Dispatcher::new(
            Arc::new(EmptyTracker),
            working_copies,
            rate_limits,
            Arc::new(NoAgentsFactory),
            config(),
            "origin",
            None,
        );

        assert_eq!(dispatcher.status().await, DispatcherStatus::Running);
        dispatcher.pause().await;
        assert_eq!(dispatcher.status().await, DispatcherStatus::Paused);
        dispatcher.resume().await;
        assert_eq!(dispatcher.status().await, DispatcherStatus::Running);
    }

    #[tokio::test]
    async fn tick_is_a_noop_when_the_ready_queue_is_empty() {
        let repo = init_repo().await;
        let working_copies = Arc::new(WorkingCopyManager::new(
            repo.path().to_string_lossy().to_string(),
            repo.path().join(".ralph-workers"),
        ));
        let rate_limits = Arc::new(RateLimitCoordinator::new(vec!["claude".to_string()]));
        let (dispatcher, _worker_events) = Dispatcher::new(
            Arc::new(EmptyTracker),
            working_copies,
            rate_limits,
            Arc::new(NoAgentsFactory),
            config(),
            "origin",
            None,
        );

        dispatcher.tick().await;
        assert!(dispatcher.worker_records().await.is_empty());
    }

    #[tokio::test]
    async fn handle_rate_limit_event_pauses_and_unpauses_the_pool() {
        let repo = init_repo().await;
        let working_copies = Arc::new(WorkingCopyManager::new(
            repo.path().to_string_lossy().to_string(),
            repo.path().join(".ralph-workers"),
        ));
        let rate_limits = Arc::new(RateLimitCoordinator::new(vec!["claude".to_string()]));
        let (dispatcher, _worker_events) = Dispatcher::new(
            Arc::new(EmptyTracker),
            working_copies,
            rate_limits,
            Arc::new(NoAgentsFactory),
            config(),
            "origin",
            None,
        );

        handle_rate_limit_event(&dispatcher, RateLimitEvent::AllLimited).await;
        assert_eq!(dispatcher.status().await, DispatcherStatus::AllLimited);
        handle_rate_limit_event(
            &dispatcher,
            RateLimitEvent::AllRecovered {
                agent: "claude".to_string(),
            },
        )
        .await;
        assert_eq!(dispatcher.status().await, DispatcherStatus::Running);
    }
}
