//! Git command runner. Every operation shells out to the `git` binary via
//! `tokio::process::Command`, the same approach `worktree_service.rs` and
//! `merge_queue.rs` use — no native git binding is in the dependency
//! stack.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};

/// Runs git commands against a fixed working directory (a working-copy or
/// the main repo checkout).
#[derive(Debug, Clone)]
pub struct GitRunner {
    cwd: String,
}

#[derive(Debug, Clone, Default)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitRunner {
    pub fn new(cwd: impl Into<String>) -> Self {
        Self { cwd: cwd.into() }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    async fn run(&self, args: &[&str]) -> DomainResult<GitOutput> {
        debug!(cwd = %self.cwd, args = ?args, "running git command");
        let output = Command::new("git")
            .current_dir(&self.cwd)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DomainError::GitError(format!("failed to spawn git {args:?}: {e}")))?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_ok(&self, args: &[&str]) -> DomainResult<GitOutput> {
        let out = self.run(args).await?;
        if !out.success {
            return Err(DomainError::GitError(format!(
                "git {args:?} failed: {}",
                out.stderr.trim()
            )));
        }
        Ok(out)
    }

    pub async fn rev_parse_head(&self) -> DomainResult<String> {
        let out = self.run_ok(&["rev-parse", "HEAD"]).await?;
        Ok(out.stdout.trim().to_string())
    }

    pub async fn branch_exists(&self, branch: &str) -> DomainResult<bool> {
        let out = self
            .run(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .await?;
        Ok(out.success)
    }

    pub async fn worktree_add(&self, path: &str, branch: &str, start_point: &str) -> DomainResult<()> {
        self.run_ok(&["worktree", "add", "-b", branch, path, start_point])
            .await?;
        Ok(())
    }

    pub async fn worktree_remove(&self, path: &str, force: bool) -> DomainResult<()> {
        let out = if force {
            self.run(&["worktree", "remove", "--force", path]).await?
        } else {
            self.run(&["worktree", "remove", path]).await?
        };
        if !out.success && !force {
            warn!(path, stderr = %out.stderr, "clean worktree removal failed, retrying with --force");
            self.run_ok(&["worktree", "remove", "--force", path]).await?;
        }
        Ok(())
    }

    pub async fn worktree_prune(&self) -> DomainResult<()> {
        self.run_ok(&["worktree", "prune"]).await?;
        Ok(())
    }

    pub async fn worktree_list_porcelain(&self) -> DomainResult<String> {
        let out = self.run_ok(&["worktree", "list", "--porcelain"]).await?;
        Ok(out.stdout)
    }

    pub async fn branch_delete(&self, branch: &str, force: bool) -> DomainResult<()> {
        let flag = if force { "-D" } else { "-d" };
        let out = self.run(&["branch", flag, branch]).await?;
        if !out.success {
            warn!(branch, stderr = %out.stderr, "failed to delete local branch");
        }
        Ok(())
    }

    pub async fn push_delete_remote_branch(&self, remote: &str, branch: &str) -> DomainResult<()> {
        let out = self.run(&["push", remote, "--delete", branch]).await?;
        if !out.success {
            warn!(branch, stderr = %out.stderr, "failed to delete remote branch");
        }
        Ok(())
    }

    pub async fn fetch(&self, remote: &str) -> DomainResult<()> {
        self.run_ok(&["fetch", remote]).await?;
        Ok(())
    }

    pub async fn checkout(&self, branch: &str) -> DomainResult<()> {
        self.run_ok(&["checkout", branch]).await?;
        Ok(())
    }

    pub async fn reset_hard(&self, reference: &str) -> DomainResult<()> {
        self.run_ok(&["reset", "--hard", reference]).await?;
        Ok(())
    }

    /// Uses `git merge-tree` to compute conflicting files without touching
    /// the working tree or index.
    pub async fn check_conflicts(&self, target: &str, branch: &str) -> DomainResult<Vec<String>> {
        let out = self.run(&["merge-tree", target, branch]).await?;
        Ok(parse_merge_tree_conflicts(&out.stdout))
    }

    pub async fn merge_no_ff(&self, branch: &str, message: &str) -> DomainResult<GitOutput> {
        self.run(&["merge", "--no-ff", "-m", message, "--", branch]).await
    }

    pub async fn merge_abort(&self) -> DomainResult<()> {
        let _ = self.run(&["merge", "--abort"]).await;
        Ok(())
    }

    pub async fn push(&self, remote: &str, branch: &str) -> DomainResult<GitOutput> {
        self.run(&["push", remote, branch]).await
    }

    pub async fn rebase_onto(&self, target: &str) -> DomainResult<GitOutput> {
        self.run(&["rebase", target]).await
    }

    pub async fn rebase_abort(&self) -> DomainResult<()> {
        let _ = self.run(&["rebase", "--abort"]).await;
        Ok(())
    }

    pub async fn push_force_with_lease(&self, remote: &str, branch: &str) -> DomainResult<GitOutput> {
        self.run(&["push", "--force-with-lease", remote, branch]).await
    }
}

/// Extracts conflicting file paths out of `git merge-tree`'s diff-like
/// output. Conflict hunks are preceded by a header line naming the path;
/// we look for conflict markers and walk back to the nearest `+++`/`---`.
fn parse_merge_tree_conflicts(stdout: &str) -> Vec<String> {
    if !stdout.contains("<<<<<<<") {
        return Vec::new();
    }
    let mut conflicts = Vec::new();
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("+++ b/") {
            let path = rest.trim();
            if !path.is_empty() && !conflicts.contains(&path.to_string()) {
                conflicts.push(path.to_string());
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_no_conflicts_when_no_markers_present() {
        let out = "diff --git a/f b/f\nindex 1..2 100644\n";
        assert!(parse_merge_tree_conflicts(out).is_empty());
    }

    #[test]
    fn parses_conflicting_file_paths() {
        let out = "\
+++ b/src/lib.rs
@@ -1,3 +1,7 @@
<<<<<<< ours
fn a() {}
=======
fn b() {}
>>>>>>> theirs
";
        let conflicts = parse_merge_tree_conflicts(out);
        assert_eq!(conflicts, vec!["src/lib.rs".to_string()]);
    }

    #[test]
    fn deduplicates_repeated_paths() {
        let out = "+++ b/a.rs\n<<<<<<< ours\n=======\n>>>>>>> theirs\n+++ b/a.rs\n<<<<<<< ours\n=======\n>>>>>>> theirs\n";
        assert_eq!(parse_merge_tree_conflicts(out), vec!["a.rs".to_string()]);
    }
}
