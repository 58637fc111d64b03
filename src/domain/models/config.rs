//! The full configuration surface, loaded by
//! `infrastructure::config::ConfigLoader` and validated before being
//! handed to the services.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMode {
    Single,
    Parallel,
}

/// `maxWorkers: 1..10 or "unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxWorkers {
    Count(u32),
    Unlimited,
}

impl Default for MaxWorkers {
    fn default() -> Self {
        MaxWorkers::Count(1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingConfig {
    #[serde(default = "default_true")]
    pub strict_dependencies: bool,
    #[serde(default)]
    pub use_parallel_tracks: bool,
}

impl SchedulingConfig {
    fn defaults() -> Self {
        Self {
            strict_dependencies: true,
            use_parallel_tracks: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    #[serde(default)]
    pub mode: PoolMode,
    #[serde(default)]
    pub max_workers: MaxWorkers,
    #[serde(default = "default_worktree_dir")]
    pub worktree_dir: String,
    #[serde(default = "SchedulingConfig::defaults")]
    pub scheduling: SchedulingConfig,
}

fn default_worktree_dir() -> String {
    crate::domain::models::working_copy::DEFAULT_BASE_DIR.to_string()
}

impl Default for PoolMode {
    fn default() -> Self {
        PoolMode::Single
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            mode: PoolMode::default(),
            max_workers: MaxWorkers::default(),
            worktree_dir: default_worktree_dir(),
            scheduling: SchedulingConfig::defaults(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    Rebase,
    Escalate,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        ConflictStrategy::Rebase
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineryConfig {
    #[serde(default = "default_target_branch")]
    pub target_branch: String,
    #[serde(default = "default_true")]
    pub run_tests: bool,
    pub test_command: Option<String>,
    #[serde(default)]
    pub on_conflict: ConflictStrategy,
    #[serde(default = "default_true")]
    pub delete_after_merge: bool,
    #[serde(default)]
    pub retry_flaky_tests: u8,
    #[serde(default = "default_max_rebase_attempts")]
    pub max_rebase_attempts: u32,
}

fn default_target_branch() -> String {
    "main".to_string()
}

fn default_max_rebase_attempts() -> u32 {
    3
}

impl Default for RefineryConfig {
    fn default() -> Self {
        Self {
            target_branch: default_target_branch(),
            run_tests: true,
            test_command: None,
            on_conflict: ConflictStrategy::default(),
            delete_after_merge: true,
            retry_flaky_tests: 0,
            max_rebase_attempts: default_max_rebase_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    pub primary: String,
    #[serde(default)]
    pub fallback: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    Retry,
    Skip,
    Abort,
}

impl Default for ErrorStrategy {
    fn default() -> Self {
        ErrorStrategy::Retry
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandlingConfig {
    #[serde(default)]
    pub strategy: ErrorStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub continue_on_non_zero_exit: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            strategy: ErrorStrategy::default(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            continue_on_non_zero_exit: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitHandlingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub recover_primary_between_iterations: bool,
}

fn default_base_backoff_ms() -> u64 {
    30_000
}

impl Default for RateLimitHandlingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            recover_primary_between_iterations: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Pretty
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    pub file_path: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: String,
}

fn default_session_path() -> String {
    ".ralph-tui/session.json".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub refinery: RefineryConfig,
    #[serde(default)]
    pub agents_section: AgentsConfig,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
    #[serde(default)]
    pub rate_limit_handling: RateLimitHandlingConfig,
    #[serde(default)]
    pub max_iterations: u32,
    #[serde(default = "default_iteration_delay")]
    pub iteration_delay: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_progress_file")]
    pub progress_file: String,
    #[serde(default)]
    pub auto_commit: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_iteration_delay() -> u64 {
    0
}

fn default_output_dir() -> String {
    ".ralph-tui".to_string()
}

fn default_progress_file() -> String {
    "PROGRESS.md".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            refinery: RefineryConfig::default(),
            agents_section: AgentsConfig::default(),
            error_handling: ErrorHandlingConfig::default(),
            rate_limit_handling: RateLimitHandlingConfig::default(),
            max_iterations: 0,
            iteration_delay: default_iteration_delay(),
            output_dir: default_output_dir(),
            progress_file: default_progress_file(),
            auto_commit: false,
            logging: LoggingConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Resolves `maxWorkers` into a concrete worker count, applying a
    /// reasonable ceiling when "unlimited" is configured.
    pub fn resolved_max_workers(&self) -> u32 {
        match self.pool.max_workers {
            MaxWorkers::Count(n) => n,
            MaxWorkers::Unlimited => 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_single_worker_with_strict_dependencies() {
        let cfg = Config::default();
        assert_eq!(cfg.pool.mode, PoolMode::Single);
        assert!(cfg.pool.scheduling.strict_dependencies);
        assert_eq!(cfg.resolved_max_workers(), 1);
    }

    #[test]
    fn unlimited_max_workers_resolves_to_a_ceiling() {
        let mut cfg = Config::default();
        cfg.pool.max_workers = MaxWorkers::Unlimited;
        assert_eq!(cfg.resolved_max_workers(), 32);
    }

    #[test]
    fn deserializes_unlimited_string_variant() {
        let parsed: MaxWorkers = serde_json::from_str("\"unlimited\"").unwrap();
        assert_eq!(parsed, MaxWorkers::Unlimited);
        let parsed: MaxWorkers = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, MaxWorkers::Count(4));
    }
}
