//! Contracts for the collaborators the command pipeline delegates to.
//!
//! Concrete project builders/runners, the comment renderer and the webhook
//! event parser live outside this crate; tests use in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use tfpilot_common::{CommitStatus, PullRequest, Repo};

use super::command::{CommandName, CommandResult, CommentCommand, ProjectCommandContext, ProjectCommandResult};
use super::context::CommandContext;
use crate::vcs::github::GithubPullRequest;
use crate::vcs::gitlab::GitlabMergeRequest;

#[async_trait]
pub trait GithubPullGetter: Send + Sync {
    async fn get_pull_request(&self, repo: &Repo, pull_num: u64) -> Result<GithubPullRequest>;
}

#[async_trait]
pub trait GitlabMergeRequestGetter: Send + Sync {
    async fn get_merge_request(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<GitlabMergeRequest>;
}

/// Domain view of a GitHub pull request.
#[derive(Debug, Clone)]
pub struct ParsedPull {
    pub pull: PullRequest,
    pub base_repo: Repo,
    pub head_repo: Repo,
}

/// Converts raw host payloads into domain objects.
pub trait EventParser: Send + Sync {
    fn parse_github_pull(&self, pull: &GithubPullRequest) -> Result<ParsedPull>;

    fn parse_gitlab_merge_request(&self, mr: &GitlabMergeRequest, base_repo: &Repo) -> PullRequest;
}

/// Expands a trigger into per-project units. Implementations consult the
/// [`Locker`](crate::locking::Locker) and the working-dir locker as needed.
#[async_trait]
pub trait ProjectCommandBuilder: Send + Sync {
    async fn build_autoplan_commands(&self, ctx: &CommandContext) -> Result<Vec<ProjectCommandContext>>;

    async fn build_plan_command(
        &self,
        ctx: &CommandContext,
        cmd: &CommentCommand,
    ) -> Result<ProjectCommandContext>;

    async fn build_apply_command(
        &self,
        ctx: &CommandContext,
        cmd: &CommentCommand,
    ) -> Result<ProjectCommandContext>;
}

/// Executes one project unit. Failures are reported inside the result.
#[async_trait]
pub trait ProjectCommandRunner: Send + Sync {
    async fn plan(&self, ctx: &ProjectCommandContext) -> ProjectCommandResult;

    async fn apply(&self, ctx: &ProjectCommandContext) -> ProjectCommandResult;
}

#[async_trait]
pub trait CommitStatusUpdater: Send + Sync {
    async fn update(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        status: CommitStatus,
        command: CommandName,
    ) -> Result<()>;

    async fn update_project_result(
        &self,
        ctx: &CommandContext,
        command: CommandName,
        res: &CommandResult,
    ) -> Result<()>;
}

/// Renders the single comment posted at the end of a run.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        res: &CommandResult,
        command: CommandName,
        log_history: &str,
        verbose: bool,
        autoplan: bool,
    ) -> String;
}
