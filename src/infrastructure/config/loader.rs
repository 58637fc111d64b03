//! Configuration loading and validation. Grounded on
//! `infrastructure/config/loader.rs`'s figment layering
//! (defaults -> project file -> local override -> env), re-targeted at
//! this crate's `Config` surface and validation rules.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid maxWorkers: must be between 1 and 32 when a count is given")]
    InvalidMaxWorkers,

    #[error("invalid logging level: {0}. must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("refinery.maxRebaseAttempts must be at least 1")]
    InvalidMaxRebaseAttempts,

    #[error("errorHandling.maxRetries must be at least 1 when strategy is retry")]
    InvalidErrorRetries,

    #[error("agents.primary cannot be empty")]
    EmptyPrimaryAgent,
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.ralph/config.yaml` (project config)
    /// 3. `.ralph/local.yaml` (optional local overrides, gitignored)
    /// 4. Environment variables (`RALPH_` prefix, `__` nesting separator)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".ralph/config.yaml"))
            .merge(Yaml::file(".ralph/local.yaml"))
            .merge(Env::prefixed("RALPH_").split("__"))
            .extract()
            .context("failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        use crate::domain::models::config::{ErrorStrategy, MaxWorkers};

        if let MaxWorkers::Count(n) = config.pool.max_workers {
            if n == 0 || n > 32 {
                return Err(ConfigError::InvalidMaxWorkers);
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.refinery.max_rebase_attempts == 0 {
            return Err(ConfigError::InvalidMaxRebaseAttempts);
        }

        if config.error_handling.strategy == ErrorStrategy::Retry
            && config.error_handling.max_retries == 0
        {
            return Err(ConfigError::InvalidErrorRetries);
        }

        if config.agents_section.primary.is_empty() {
            return Err(ConfigError::EmptyPrimaryAgent);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{ErrorStrategy, MaxWorkers};

    #[test]
    fn default_config_is_invalid_without_a_primary_agent() {
        let config = Config::default();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyPrimaryAgent)
        ));
    }

    #[test]
    fn a_config_with_a_primary_agent_validates() {
        let mut config = Config::default();
        config.agents_section.primary = "claude".to_string();
        ConfigLoader::validate(&config).expect("should validate");
    }

    #[test]
    fn rejects_zero_max_workers() {
        let mut config = Config::default();
        config.agents_section.primary = "claude".to_string();
        config.pool.max_workers = MaxWorkers::Count(0);
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxWorkers)
        ));
    }

    #[test]
    fn unlimited_max_workers_is_always_valid() {
        let mut config = Config::default();
        config.agents_section.primary = "claude".to_string();
        config.pool.max_workers = MaxWorkers::Unlimited;
        ConfigLoader::validate(&config).expect("unlimited should validate");
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = Config::default();
        config.agents_section.primary = "claude".to_string();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn rejects_zero_rebase_attempts() {
        let mut config = Config::default();
        config.agents_section.primary = "claude".to_string();
        config.refinery.max_rebase_attempts = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxRebaseAttempts)
        ));
    }

    #[test]
    fn retry_strategy_requires_at_least_one_retry() {
        let mut config = Config::default();
        config.agents_section.primary = "claude".to_string();
        config.error_handling.strategy = ErrorStrategy::Retry;
        config.error_handling.max_retries = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidErrorRetries)
        ));
    }

    #[test]
    fn skip_strategy_tolerates_zero_retries() {
        let mut config = Config::default();
        config.agents_section.primary = "claude".to_string();
        config.error_handling.strategy = ErrorStrategy::Skip;
        config.error_handling.max_retries = 0;
        ConfigLoader::validate(&config).expect("skip strategy ignores max_retries");
    }

    #[test]
    fn hierarchical_merge_lets_overrides_win() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base = NamedTempFile::new().unwrap();
        writeln!(base, "agentsSection:\n  primary: claude\nmaxIterations: 5").unwrap();
        base.flush().unwrap();

        let mut over = NamedTempFile::new().unwrap();
        writeln!(over, "maxIterations: 15").unwrap();
        over.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base.path()))
            .merge(Yaml::file(over.path()))
            .extract()
            .unwrap();

        assert_eq!(config.max_iterations, 15);
        assert_eq!(config.agents_section.primary, "claude");
    }
}
