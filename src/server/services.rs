use std::sync::Arc;

use anyhow::{Context, Result};
use tfpilot_common::VcsHost;

use crate::config::{ALLOW_FORK_PRS_FLAG, ServerConfig};
use crate::events::{
    DefaultCommandRunner, DefaultCommitStatusUpdater, DefaultEventParser, DeleteLockCommand,
    FileWorkspace, GithubPullGetter, GitlabMergeRequestGetter, ProjectCommandBuilder,
    ProjectCommandRunner, PullClosedExecutor, Renderer, WorkingDir, WorkingDirLocker,
};
use crate::locking::{LockManager, Locker, SqliteBackend};
use crate::vcs::{ClientProxy, GithubClient, GitlabClient, VcsClient};

/// Process-wide collaborators built once from [`ServerConfig`].
///
/// Every executor handed out here shares the same lock store and the same
/// [`WorkingDirLocker`], so a command running against a checkout and a
/// deletion of that checkout always see each other's claims.
#[derive(Clone)]
pub struct Services {
    pub locker: Arc<dyn Locker>,
    pub working_dir: Arc<dyn WorkingDir>,
    pub working_dir_locker: WorkingDirLocker,
    pub vcs_client: Arc<dyn VcsClient>,
    pub github: Option<Arc<GithubClient>>,
    pub gitlab: Option<Arc<GitlabClient>>,
    pub github_hostname: String,
    pub allow_fork_prs: bool,
}

impl Services {
    /// Open the lock database and build clients for the configured hosts.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let db_path = config.db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let backend = SqliteBackend::new(&db_path)
            .with_context(|| format!("Failed to open lock database {}", db_path.display()))?;

        let github = config
            .github
            .as_ref()
            .map(|gh| GithubClient::new(&gh.hostname, &gh.user, &gh.token))
            .transpose()?
            .map(Arc::new);
        let gitlab = config
            .gitlab
            .as_ref()
            .map(|gl| GitlabClient::new(&gl.hostname, &gl.token))
            .transpose()?
            .map(Arc::new);
        let proxy = ClientProxy::new(
            github.clone().map(|c| c as Arc<dyn VcsClient>),
            gitlab.clone().map(|c| c as Arc<dyn VcsClient>),
        );

        Ok(Self {
            locker: Arc::new(LockManager::new(Arc::new(backend))),
            working_dir: Arc::new(FileWorkspace::new(&config.data_dir)),
            working_dir_locker: WorkingDirLocker::new(),
            vcs_client: Arc::new(proxy),
            github,
            gitlab,
            github_hostname: config
                .github
                .as_ref()
                .map(|gh| gh.hostname.clone())
                .unwrap_or_else(|| VcsHost::github().hostname),
            allow_fork_prs: config.allow_fork_prs,
        })
    }

    pub fn delete_lock_command(&self) -> DeleteLockCommand {
        DeleteLockCommand {
            locker: self.locker.clone(),
            working_dir: self.working_dir.clone(),
            working_dir_locker: self.working_dir_locker.clone(),
            vcs_client: self.vcs_client.clone(),
        }
    }

    pub fn pull_closed_executor(&self) -> PullClosedExecutor {
        PullClosedExecutor {
            locker: self.locker.clone(),
            working_dir: self.working_dir.clone(),
            working_dir_locker: self.working_dir_locker.clone(),
            vcs_client: self.vcs_client.clone(),
        }
    }

    /// Command runner over the configured hosts. The builder and project
    /// runner should take [`Services::locker`] and
    /// [`Services::working_dir_locker`] for their own locking.
    pub fn command_runner(
        &self,
        project_command_builder: Arc<dyn ProjectCommandBuilder>,
        project_command_runner: Arc<dyn ProjectCommandRunner>,
        renderer: Arc<dyn Renderer>,
    ) -> DefaultCommandRunner {
        DefaultCommandRunner {
            vcs_client: self.vcs_client.clone(),
            github_pull_getter: self
                .github
                .clone()
                .map(|c| c as Arc<dyn GithubPullGetter>),
            gitlab_merge_request_getter: self
                .gitlab
                .clone()
                .map(|c| c as Arc<dyn GitlabMergeRequestGetter>),
            commit_status_updater: Arc::new(DefaultCommitStatusUpdater::new(
                self.vcs_client.clone(),
            )),
            event_parser: Arc::new(DefaultEventParser::new(self.github_hostname.clone())),
            renderer,
            allow_fork_prs: self.allow_fork_prs,
            allow_fork_prs_flag: ALLOW_FORK_PRS_FLAG.to_string(),
            project_command_builder,
            project_command_runner,
        }
    }
}
