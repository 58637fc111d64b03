//! Session store. Owns the crash-safe `SessionSnapshot` document and its
//! adjacent lock file. Follows `services/event_store.rs`'s typed
//! snapshot-plus-summary-returning-recovery shape, and the standard
//! temp-file-rename persistence convention (write beside the target, then
//! rename, so a crash mid-write never leaves a half-written file behind).

use std::path::{Path, PathBuf};

use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RecoverySummary, SessionSnapshot, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockFile {
    pid: u32,
    acquired_at: chrono::DateTime<chrono::Utc>,
}

pub struct SessionStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = Self::lock_path_for(&path);
        Self { path, lock_path }
    }

    fn lock_path_for(path: &Path) -> PathBuf {
        let mut lock = path.as_os_str().to_owned();
        lock.push(".lock");
        PathBuf::from(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_atomic(path: &Path, contents: &str) -> DomainResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::GitError(format!("failed to create session dir: {e}")))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| DomainError::GitError(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| DomainError::GitError(format!("failed to rename session file into place: {e}")))?;
        Ok(())
    }

    /// Loads the snapshot if present. A v1 (single-worker) document is
    /// still readable here — it simply has no `pool` block, which
    /// deserializes to `None`.
    pub async fn load(&self) -> DomainResult<Option<SessionSnapshot>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(snapshot) => Ok(Some(snapshot)),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "session file is corrupt, ignoring");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DomainError::GitError(format!("failed to read session file: {e}"))),
        }
    }

    pub async fn save(&self, snapshot: &SessionSnapshot) -> DomainResult<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        Self::write_atomic(&self.path, &json).await
    }

    /// Acquires the session lock for this process. Fails if another
    /// process currently holds a live lock; a lock whose owning pid is no
    /// longer alive is treated as stale and silently replaced.
    pub async fn acquire_lock(&self) -> DomainResult<()> {
        if let Some(existing) = self.read_lock().await? {
            if Self::is_alive(existing.pid) {
                return Err(DomainError::LockStale { pid: existing.pid });
            }
            warn!(pid = existing.pid, "replacing stale session lock");
        }

        let lock = LockFile {
            pid: std::process::id(),
            acquired_at: chrono::Utc::now(),
        };
        let json = serde_json::to_string_pretty(&lock)?;
        Self::write_atomic(&self.lock_path, &json).await
    }

    pub async fn release_lock(&self) -> DomainResult<()> {
        match tokio::fs::remove_file(&self.lock_path).await {
            Ok(()) | Err(_) if !self.lock_path.exists() => Ok(()),
            Err(e) => Err(DomainError::GitError(format!("failed to remove lock file: {e}"))),
            Ok(()) => Ok(()),
        }
    }

    async fn read_lock(&self) -> DomainResult<Option<LockFile>> {
        match tokio::fs::read_to_string(&self.lock_path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DomainError::GitError(format!("failed to read lock file: {e}"))),
        }
    }

    /// True when a lock exists and its owning process is still running.
    pub async fn is_locked_by_live_process(&self) -> DomainResult<bool> {
        Ok(self
            .read_lock()
            .await?
            .is_some_and(|lock| Self::is_alive(lock.pid)))
    }

    fn is_alive(pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    /// Detects a session left behind by a process that is no longer
    /// running and, if one is found, runs `SessionSnapshot::recover` and
    /// persists the result. Returns `None` when there is nothing to
    /// recover (no prior session, or it was already stopped cleanly).
    pub async fn detect_and_recover(&self) -> DomainResult<Option<RecoverySummary>> {
        let Some(mut snapshot) = self.load().await? else {
            return Ok(None);
        };

        if snapshot.status != SessionStatus::Running {
            return Ok(None);
        }
        if self.is_locked_by_live_process().await? {
            return Ok(None);
        }

        info!(session_id = %snapshot.session_id, "recovering interrupted session");
        let summary = snapshot.recover();
        self.save(&snapshot).await?;
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let snapshot = SessionSnapshot::new_v2("s1".into(), "parallel".into(), None);
        store.save(&snapshot).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "s1");
    }

    #[tokio::test]
    async fn load_returns_none_when_file_absent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("missing.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn acquire_lock_rejects_a_live_duplicate() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        store.acquire_lock().await.unwrap();
        let err = store.acquire_lock().await.unwrap_err();
        assert!(matches!(err, DomainError::LockStale { .. }));
    }

    #[tokio::test]
    async fn acquire_lock_replaces_a_lock_from_a_dead_pid() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let stale = LockFile {
            pid: 999_999,
            acquired_at: chrono::Utc::now(),
        };
        SessionStore::write_atomic(&store.lock_path, &serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();
        store.acquire_lock().await.unwrap();
    }

    #[tokio::test]
    async fn detect_and_recover_clears_an_interrupted_running_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let mut snapshot = SessionSnapshot::new_v2("s1".into(), "parallel".into(), None);
        snapshot
            .pool
            .as_mut()
            .unwrap()
            .active_task_ids
            .insert("T1".into());
        store.save(&snapshot).await.unwrap();

        let summary = store.detect_and_recover().await.unwrap().unwrap();
        assert_eq!(summary.cleared_active_tasks, vec!["T1".to_string()]);

        let reloaded = store.load().await.unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Interrupted);
    }

    #[tokio::test]
    async fn detect_and_recover_is_a_noop_when_nothing_is_running() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let mut snapshot = SessionSnapshot::new_v2("s1".into(), "parallel".into(), None);
        snapshot.mark_stopped(SessionStatus::Completed);
        store.save(&snapshot).await.unwrap();

        assert!(store.detect_and_recover().await.unwrap().is_none());
    }
}
