//! Domain error taxonomy. Every async service operation returns one of
//! these as an `Err` outcome rather than panicking; component boundaries
//! translate them into the `failed`/`conflict`/`rate_limited` states the
//! spec names instead of letting exceptions cross a boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("task {0} is not ready: unmet dependencies")]
    TaskNotReady(String),

    #[error("worker {0} already holds an assignment")]
    AlreadyAssigned(String),

    #[error("failed to spawn agent {agent}: {source}")]
    AgentSpawnError {
        agent: String,
        #[source]
        source: std::io::Error,
    },

    #[error("agent {agent} is rate-limited{}", retry_after_seconds.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited {
        agent: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("merge conflict on branch {branch}: {} file(s)", files.len())]
    MergeConflict { branch: String, files: Vec<String> },

    #[error("tests failed while merging branch {branch}")]
    MergeTestFail { branch: String },

    #[error("failed to push merge of branch {branch}: {reason}")]
    MergePushFail { branch: String, reason: String },

    #[error("rebase attempts exhausted for branch {branch} ({attempts} attempts)")]
    RebaseExhausted { branch: String, attempts: u32 },

    #[error("session store file is corrupt or has an unrecognized shape: {0}")]
    SessionCorrupt(String),

    #[error("session lock is stale (owning process {pid} is not alive)")]
    LockStale { pid: u32 },

    #[error("working copy {0} already exists")]
    WorkingCopyConflict(String),

    #[error("git command failed: {0}")]
    GitError(String),

    #[error("tracker operation failed: {0}")]
    TrackerError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SessionCorrupt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_without_retry_after_omits_suffix() {
        let err = DomainError::RateLimited {
            agent: "claude".into(),
            retry_after_seconds: None,
        };
        assert_eq!(err.to_string(), "agent claude is rate-limited");
    }

    #[test]
    fn rate_limited_with_retry_after_includes_suffix() {
        let err = DomainError::RateLimited {
            agent: "claude".into(),
            retry_after_seconds: Some(30),
        };
        assert_eq!(
            err.to_string(),
            "agent claude is rate-limited, retry after 30s"
        );
    }
}
