//! Working-copy manager. Grounded on `services/worktree_service.rs`:
//! git worktree add/remove via `tokio::process::Command`, a JSON sidecar for
//! cross-restart bookkeeping, and a reconcile-on-startup pass that prunes
//! stale state.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::working_copy::{
    branch_name, sanitize_task_id, WorkingCopy, WorkingCopySidecar, DEFAULT_BASE_DIR, SIDECAR_FILENAME,
};
use crate::infrastructure::git::GitRunner;

pub struct WorkingCopyManager {
    base_dir: PathBuf,
    repo_root: GitRunner,
    known: RwLock<Vec<WorkingCopy>>,
}

impl WorkingCopyManager {
    pub fn new(repo_root: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            repo_root: GitRunner::new(repo_root.into()),
            known: RwLock::new(Vec::new()),
        }
    }

    pub fn with_default_base_dir(repo_root: impl Into<String>) -> Self {
        Self::new(repo_root, PathBuf::from(DEFAULT_BASE_DIR))
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Creates a fresh working-copy rooted at `start_point` (default: the
    /// repo's current HEAD), on a new branch `work/{name}/{taskId}`.
    pub async fn create(
        &self,
        name: &str,
        task_id: &str,
        start_point: Option<&str>,
    ) -> DomainResult<WorkingCopy> {
        let path = self.path_for(name);
        if path.exists() {
            return Err(DomainError::WorkingCopyConflict(name.to_string()));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::GitError(format!("failed to create base dir: {e}")))?;
        }

        let branch = branch_name(name, task_id);
        let start_point = match start_point {
            Some(sp) => sp.to_string(),
            None => self.repo_root.rev_parse_head().await?,
        };

        info!(name, %branch, %start_point, "creating working copy");
        self.repo_root
            .worktree_add(&path.to_string_lossy(), &branch, &start_point)
            .await?;

        let working_copy = WorkingCopy {
            name: name.to_string(),
            path: path.to_string_lossy().into_owned(),
            branch,
            task_id: Some(task_id.to_string()),
            created_at: Utc::now(),
        };

        self.write_sidecar(&working_copy).await?;
        self.known.write().await.push(working_copy.clone());
        Ok(working_copy)
    }

    async fn write_sidecar(&self, wc: &WorkingCopy) -> DomainResult<()> {
        let sidecar = WorkingCopySidecar::from(wc);
        let json = serde_json::to_string_pretty(&sidecar)?;
        let sidecar_path = Path::new(&wc.path).join(SIDECAR_FILENAME);
        tokio::fs::write(&sidecar_path, json)
            .await
            .map_err(|e| DomainError::GitError(format!("failed to write sidecar: {e}")))?;
        Ok(())
    }

    /// Removes a working-copy. Attempts a clean `git worktree remove`
    /// first; on failure, force-deletes the directory and prunes stale
    /// references. Optionally force-deletes the associated branch too.
    pub async fn remove(&self, name: &str, also_delete_branch: bool) -> DomainResult<()> {
        let path = self.path_for(name);
        let branch = self.branch_of(name).await;

        match self.repo_root.worktree_remove(&path.to_string_lossy(), false).await {
            Ok(()) => {}
            Err(e) => {
                warn!(name, error = %e, "clean worktree removal failed, force-deleting directory");
                if path.exists() {
                    let _ = tokio::fs::remove_dir_all(&path).await;
                }
                self.repo_root.worktree_prune().await?;
            }
        }

        if also_delete_branch {
            if let Some(branch) = branch {
                self.repo_root.branch_delete(&branch, true).await?;
            }
        }

        self.known.write().await.retain(|wc| wc.name != name);
        Ok(())
    }

    async fn branch_of(&self, name: &str) -> Option<String> {
        self.known
            .read()
            .await
            .iter()
            .find(|wc| wc.name == name)
            .map(|wc| wc.branch.clone())
    }

    pub async fn list(&self) -> Vec<WorkingCopy> {
        self.known.read().await.clone()
    }

    pub async fn get(&self, name: &str) -> Option<WorkingCopy> {
        self.known.read().await.iter().find(|wc| wc.name == name).cloned()
    }

    pub async fn update_task_id(&self, name: &str, task_id: Option<String>) -> DomainResult<()> {
        let mut known = self.known.write().await;
        let wc = known
            .iter_mut()
            .find(|wc| wc.name == name)
            .ok_or_else(|| DomainError::GitError(format!("unknown working copy {name}")))?;
        wc.task_id = task_id;
        let wc = wc.clone();
        drop(known);
        self.write_sidecar(&wc).await
    }

    /// Prunes stale git worktree references and rebuilds `known` from
    /// directories under the base dir whose sidecar/branch match this
    /// manager's naming convention. Run once at pool startup.
    pub async fn reconcile(&self) -> DomainResult<()> {
        self.repo_root.worktree_prune().await?;

        let mut rebuilt = Vec::new();
        if self.base_dir.exists() {
            let mut entries = tokio::fs::read_dir(&self.base_dir)
                .await
                .map_err(|e| DomainError::GitError(format!("failed to read base dir: {e}")))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| DomainError::GitError(e.to_string()))?
            {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let sidecar_path = path.join(SIDECAR_FILENAME);
                let Ok(contents) = tokio::fs::read_to_string(&sidecar_path).await else {
                    debug!(path = %path.display(), "removing base-dir entry with no valid sidecar");
                    let _ = tokio::fs::remove_dir_all(&path).await;
                    continue;
                };
                let Ok(sidecar) = serde_json::from_str::<WorkingCopySidecar>(&contents) else {
                    let _ = tokio::fs::remove_dir_all(&path).await;
                    continue;
                };
                let branch = branch_name(&sidecar.name, sidecar.task_id.as_deref().unwrap_or("unknown"));
                rebuilt.push(WorkingCopy {
                    name: sidecar.name,
                    path: path.to_string_lossy().into_owned(),
                    branch,
                    task_id: sidecar.task_id,
                    created_at: sidecar.created_at,
                });
            }
        }

        *self.known.write().await = rebuilt;
        Ok(())
    }
}

#[allow(dead_code)]
fn sanitize(task_id: &str) -> String {
    sanitize_task_id(task_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::process::Command;

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
        Command::new("git")
            .current_dir(path)
            .args(["add", "."])
            .output()
            .await
            .unwrap();
        Command::new("git")
            .current_dir(path)
            .args(["commit", "-q", "-m", "init"])
            .output()
            .await
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn create_refuses_when_directory_already_exists() {
        let repo = init_repo().await;
        let base = repo.path().join(".ralph-workers");
        let manager = WorkingCopyManager::new(repo.path().to_string_lossy().to_string(), base.clone());

        let wc = manager.create("worker1", "T1", None).await.unwrap();
        assert_eq!(wc.branch, "work/worker1/T1");
        assert!(Path::new(&wc.path).join(SIDECAR_FILENAME).exists());

        let err = manager.create("worker1", "T2", None).await.unwrap_err();
        assert!(matches!(err, DomainError::WorkingCopyConflict(_)));
    }

    #[tokio::test]
    async fn remove_deletes_directory_and_forgets_it() {
        let repo = init_repo().await;
        let base = repo.path().join(".ralph-workers");
        let manager = WorkingCopyManager::new(repo.path().to_string_lossy().to_string(), base.clone());

        let wc = manager.create("worker1", "T1", None).await.unwrap();
        manager.remove("worker1", false).await.unwrap();
        assert!(!Path::new(&wc.path).exists());
        assert!(manager.get("worker1").await.is_none());
    }

    #[tokio::test]
    async fn list_returns_known_working_copies() {
        let repo = init_repo().await;
        let base = repo.path().join(".ralph-workers");
        let manager = WorkingCopyManager::new(repo.path().to_string_lossy().to_string(), base);
        manager.create("worker1", "T1", None).await.unwrap();
        manager.create("worker2", "T2", None).await.unwrap();
        let mut names: Vec<_> = manager.list().await.into_iter().map(|wc| wc.name).collect();
        names.sort();
        assert_eq!(names, vec!["worker1".to_string(), "worker2".to_string()]);
    }
}
