use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use tfpilot_common::{Lock, PullRequest, Repo};

use super::working_dir::WorkingDir;
use super::working_dir_locker::WorkingDirLocker;
use crate::locking::Locker;
use crate::vcs::VcsClient;

/// Cleans up after a pull request is merged or closed.
#[derive(Clone)]
pub struct PullClosedExecutor {
    pub locker: Arc<dyn Locker>,
    pub working_dir: Arc<dyn WorkingDir>,
    pub working_dir_locker: WorkingDirLocker,
    pub vcs_client: Arc<dyn VcsClient>,
}

impl PullClosedExecutor {
    /// Release every lock held by the pull, delete all of its checkouts under
    /// a pull-wide working-dir claim and list what was released in a comment.
    /// No comment is posted when the pull held no locks.
    pub async fn clean_up_pull(&self, repo: &Repo, pull: &PullRequest) -> Result<()> {
        let locks = self
            .locker
            .unlock_by_pull(&repo.full_name, pull.num)
            .await
            .context("cleaning up locks")?;

        // The whole pull directory goes, so every checkout in it must be idle.
        let guard = self
            .working_dir_locker
            .try_lock_pull(&repo.full_name, pull.num)
            .context("cleaning workspace")?;
        self.working_dir
            .delete(repo, pull)
            .await
            .context("cleaning workspace")?;
        drop(guard);

        if locks.is_empty() {
            return Ok(());
        }
        tracing::info!(repo = %repo.full_name, pull = pull.num, count = locks.len(), "deleted locks and workspaces for closed pull request");
        self.vcs_client
            .create_comment(repo, pull.num, &released_locks_comment(&locks))
            .await
            .context("commenting on pull request")
    }
}

/// Comment listing released locks grouped by directory, sorted by path.
fn released_locks_comment(locks: &[Lock]) -> String {
    let mut by_dir: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for lock in locks {
        by_dir
            .entry(lock.project.path.as_str())
            .or_default()
            .insert(lock.workspace.as_str());
    }

    let mut comment = String::from(
        "Locks and plans deleted for the projects and workspaces modified in this pull request:\n",
    );
    for (dir, workspaces) in by_dir {
        let workspaces: Vec<String> = workspaces.iter().map(|w| format!("`{}`", w)).collect();
        comment.push_str(&format!(
            "\n- dir: `{}` workspaces: {}",
            dir,
            workspaces.join(", ")
        ));
    }
    comment
}
