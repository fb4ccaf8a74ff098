use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tfpilot_common::{PullRequest, Repo};

/// Local checkouts of pull requests, one per workspace.
///
/// Callers must hold the matching
/// [`WorkingDirLock`](super::working_dir_locker::WorkingDirLock) while
/// mutating a checkout.
#[async_trait]
pub trait WorkingDir: Send + Sync {
    /// Path of the checkout for this pull + workspace, whether or not it exists.
    fn get_working_dir(&self, repo: &Repo, pull: &PullRequest, workspace: &str) -> PathBuf;

    /// Remove the checkout (and any plan files in it) for one workspace.
    async fn delete_for_workspace(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        workspace: &str,
    ) -> Result<()>;

    /// Remove every checkout belonging to the pull request.
    async fn delete(&self, repo: &Repo, pull: &PullRequest) -> Result<()>;
}

/// Checkouts laid out as `<data_dir>/repos/<owner>/<name>/<pull>/<workspace>`.
#[derive(Debug, Clone)]
pub struct FileWorkspace {
    data_dir: PathBuf,
}

impl FileWorkspace {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn pull_dir(&self, repo: &Repo, pull: &PullRequest) -> PathBuf {
        self.data_dir
            .join("repos")
            .join(&repo.full_name)
            .join(pull.num.to_string())
    }
}

#[async_trait]
impl WorkingDir for FileWorkspace {
    fn get_working_dir(&self, repo: &Repo, pull: &PullRequest, workspace: &str) -> PathBuf {
        self.pull_dir(repo, pull).join(workspace)
    }

    async fn delete_for_workspace(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        workspace: &str,
    ) -> Result<()> {
        let dir = self.get_working_dir(repo, pull, workspace);
        remove_dir_if_exists(&dir)
            .await
            .with_context(|| format!("deleting workspace {}", dir.display()))
    }

    async fn delete(&self, repo: &Repo, pull: &PullRequest) -> Result<()> {
        let dir = self.pull_dir(repo, pull);
        remove_dir_if_exists(&dir)
            .await
            .with_context(|| format!("deleting checkouts in {}", dir.display()))
    }
}

async fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
