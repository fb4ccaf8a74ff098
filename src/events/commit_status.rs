use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tfpilot_common::{CommitStatus, PullRequest, Repo};

use super::collaborators::CommitStatusUpdater;
use super::command::{CommandName, CommandResult};
use super::context::CommandContext;
use crate::vcs::VcsClient;

/// Posts commit statuses through a [`VcsClient`].
#[derive(Clone)]
pub struct DefaultCommitStatusUpdater {
    client: Arc<dyn VcsClient>,
}

impl DefaultCommitStatusUpdater {
    pub fn new(client: Arc<dyn VcsClient>) -> Self {
        Self { client }
    }
}

/// Aggregate status of a finished run: any error, failure or unsuccessful
/// project fails the run. Zero projects is a success.
pub fn aggregate_status(res: &CommandResult) -> CommitStatus {
    if res.has_errors() {
        CommitStatus::Failed
    } else {
        CommitStatus::Success
    }
}

/// Status description shown next to the check, e.g. `Plan succeeded`.
pub fn status_description(command: CommandName, status: CommitStatus) -> String {
    let status = match status {
        CommitStatus::Pending => "in progress",
        CommitStatus::Success => "succeeded",
        CommitStatus::Failed => "failed",
    };
    format!("{} {}", command.title(), status)
}

#[async_trait]
impl CommitStatusUpdater for DefaultCommitStatusUpdater {
    async fn update(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        status: CommitStatus,
        command: CommandName,
    ) -> Result<()> {
        self.client
            .update_status(repo, pull, status, &status_description(command, status))
            .await
    }

    async fn update_project_result(
        &self,
        ctx: &CommandContext,
        command: CommandName,
        res: &CommandResult,
    ) -> Result<()> {
        self.update(&ctx.base_repo, &ctx.pull, aggregate_status(res), command)
            .await
    }
}
