use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures::FutureExt;
use tfpilot_common::{CommitStatus, PullRequest, Repo, User, VcsHostType};

use super::collaborators::{
    CommitStatusUpdater, EventParser, GithubPullGetter, GitlabMergeRequestGetter,
    ProjectCommandBuilder, ProjectCommandRunner, Renderer,
};
use super::command::{
    AutoplanCommand, CommandDescriptor, CommandName, CommandResult, CommentCommand, ProjectResult,
};
use super::context::CommandContext;
use crate::errors::{CommandError, ValidationError};
use crate::logging::CommandLogger;
use crate::recovery::{self, PanicError};
use crate::vcs::VcsClient;

/// How an invocation ended. The host process only observes this value; it
/// never sees a panic.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run reached the final comment.
    Completed(CommandResult),
    /// Validation refused the request; one explanatory comment was posted.
    Rejected(ValidationError),
    /// Pull request data could not be resolved; nothing was posted.
    Aborted(CommandError),
    /// A panic was caught; one comment with the payload and stack was posted.
    Panicked(PanicError),
}

/// Entry points for running plan/apply against a pull request.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Plan every project touched by the pull request.
    async fn run_autoplan_command(
        &self,
        base_repo: Repo,
        head_repo: Repo,
        pull: PullRequest,
        user: User,
    ) -> RunOutcome;

    /// Run a command parsed from a pull request comment. `maybe_head_repo`
    /// may be absent when the triggering event did not carry it; it is then
    /// resolved from the host.
    async fn run_comment_command(
        &self,
        base_repo: Repo,
        maybe_head_repo: Option<Repo>,
        user: User,
        pull_num: u64,
        cmd: CommentCommand,
    ) -> RunOutcome;
}

/// The orchestrator: validates, reports status, delegates project work to
/// the builder/runner and posts a single comment per invocation.
pub struct DefaultCommandRunner {
    pub vcs_client: Arc<dyn VcsClient>,
    pub github_pull_getter: Option<Arc<dyn GithubPullGetter>>,
    pub gitlab_merge_request_getter: Option<Arc<dyn GitlabMergeRequestGetter>>,
    pub commit_status_updater: Arc<dyn CommitStatusUpdater>,
    pub event_parser: Arc<dyn EventParser>,
    pub renderer: Arc<dyn Renderer>,
    /// Whether commands may run on pull requests from forks.
    pub allow_fork_prs: bool,
    /// Flag name shown to users when a fork pull request is refused.
    pub allow_fork_prs_flag: String,
    pub project_command_builder: Arc<dyn ProjectCommandBuilder>,
    pub project_command_runner: Arc<dyn ProjectCommandRunner>,
}

#[async_trait]
impl CommandRunner for DefaultCommandRunner {
    async fn run_autoplan_command(
        &self,
        base_repo: Repo,
        head_repo: Repo,
        pull: PullRequest,
        user: User,
    ) -> RunOutcome {
        let log = CommandLogger::for_pull(&base_repo.full_name, pull.num);
        let pull_num = pull.num;
        let ctx = CommandContext {
            user,
            log: log.clone(),
            pull,
            base_repo: base_repo.clone(),
            head_repo,
        };
        self.recover_panics(&base_repo, pull_num, &log, self.autoplan(ctx))
            .await
    }

    async fn run_comment_command(
        &self,
        base_repo: Repo,
        maybe_head_repo: Option<Repo>,
        user: User,
        pull_num: u64,
        cmd: CommentCommand,
    ) -> RunOutcome {
        let log = CommandLogger::for_pull(&base_repo.full_name, pull_num);
        let run = self.comment_command(
            base_repo.clone(),
            maybe_head_repo,
            user,
            pull_num,
            cmd,
            log.clone(),
        );
        self.recover_panics(&base_repo, pull_num, &log, run).await
    }
}

impl DefaultCommandRunner {
    async fn autoplan(&self, ctx: CommandContext) -> RunOutcome {
        if let Err(rejection) = self.validate(&ctx).await {
            return RunOutcome::Rejected(rejection);
        }
        self.set_pending(&ctx, CommandName::Plan).await;

        let units = match self
            .project_command_builder
            .build_autoplan_commands(&ctx)
            .await
        {
            Ok(units) => units,
            Err(err) => {
                let res = CommandResult::error(&CommandError::Builder(err));
                self.update_pull(&ctx, &AutoplanCommand, &res).await;
                return RunOutcome::Completed(res);
            }
        };

        let mut results = Vec::with_capacity(units.len());
        for unit in &units {
            let result = self.project_command_runner.plan(unit).await;
            results.push(ProjectResult {
                repo_rel_dir: unit.repo_rel_dir.clone(),
                workspace: unit.workspace.clone(),
                result,
            });
        }
        let res = CommandResult::Projects { results };
        self.update_pull(&ctx, &AutoplanCommand, &res).await;
        RunOutcome::Completed(res)
    }

    async fn comment_command(
        &self,
        base_repo: Repo,
        maybe_head_repo: Option<Repo>,
        user: User,
        pull_num: u64,
        cmd: CommentCommand,
        log: CommandLogger,
    ) -> RunOutcome {
        let (pull, head_repo) = match self
            .resolve_pull(&base_repo, maybe_head_repo, pull_num)
            .await
        {
            Ok(resolved) => resolved,
            Err(err) => {
                log.error(err.to_string());
                return RunOutcome::Aborted(err);
            }
        };
        let ctx = CommandContext {
            user,
            log,
            pull,
            base_repo,
            head_repo,
        };

        if let Err(rejection) = self.validate(&ctx).await {
            return RunOutcome::Rejected(rejection);
        }
        self.set_pending(&ctx, cmd.name).await;

        let built = match cmd.name {
            CommandName::Plan => self.project_command_builder.build_plan_command(&ctx, &cmd).await,
            CommandName::Apply => self.project_command_builder.build_apply_command(&ctx, &cmd).await,
        };
        let res = match built {
            Err(err) => CommandResult::error(&CommandError::Builder(err)),
            Ok(unit) => {
                let result = match cmd.name {
                    CommandName::Plan => self.project_command_runner.plan(&unit).await,
                    CommandName::Apply => self.project_command_runner.apply(&unit).await,
                };
                CommandResult::Projects {
                    results: vec![ProjectResult {
                        repo_rel_dir: cmd.repo_rel_dir.clone(),
                        workspace: cmd.workspace.clone(),
                        result,
                    }],
                }
            }
        };
        self.update_pull(&ctx, &cmd, &res).await;
        RunOutcome::Completed(res)
    }

    /// Fetch authoritative pull data from the repo's host.
    async fn resolve_pull(
        &self,
        base_repo: &Repo,
        maybe_head_repo: Option<Repo>,
        pull_num: u64,
    ) -> Result<(PullRequest, Repo), CommandError> {
        match base_repo.vcs_host.host_type {
            VcsHostType::Github => {
                let getter = self
                    .github_pull_getter
                    .as_ref()
                    .ok_or(CommandError::Configuration { host: "GitHub" })?;
                let raw = getter
                    .get_pull_request(base_repo, pull_num)
                    .await
                    .context("making pull request API call to GitHub")
                    .map_err(CommandError::PullResolution)?;
                let parsed = self
                    .event_parser
                    .parse_github_pull(&raw)
                    .context("extracting required fields from comment data")
                    .map_err(CommandError::PullResolution)?;
                Ok((parsed.pull, parsed.head_repo))
            }
            VcsHostType::Gitlab => {
                let getter = self
                    .gitlab_merge_request_getter
                    .as_ref()
                    .ok_or(CommandError::Configuration { host: "GitLab" })?;
                let raw = getter
                    .get_merge_request(&base_repo.full_name, pull_num)
                    .await
                    .context("making merge request API call to GitLab")
                    .map_err(CommandError::PullResolution)?;
                let pull = self.event_parser.parse_gitlab_merge_request(&raw, base_repo);
                let head_repo = maybe_head_repo.unwrap_or_else(|| base_repo.clone());
                Ok((pull, head_repo))
            }
        }
    }

    /// Refuse fork and closed pull requests, explaining why in one comment.
    async fn validate(&self, ctx: &CommandContext) -> Result<(), ValidationError> {
        let rejection = if !self.allow_fork_prs && ctx.is_fork() {
            ValidationError::ForkPullRequest
        } else if ctx.pull.state != tfpilot_common::PullState::Open {
            ValidationError::ClosedPullRequest
        } else {
            return Ok(());
        };

        ctx.log.info(rejection.to_string());
        let comment = match rejection {
            ValidationError::ForkPullRequest => format!(
                "tfpilot commands can't be run on fork pull requests. To enable, set --{}",
                self.allow_fork_prs_flag
            ),
            ValidationError::ClosedPullRequest => {
                "tfpilot commands can't be run on closed pull requests".to_string()
            }
        };
        self.comment(&ctx.base_repo, ctx.pull.num, &ctx.log, &comment)
            .await;
        Err(rejection)
    }

    async fn set_pending(&self, ctx: &CommandContext, command: CommandName) {
        if let Err(err) = self
            .commit_status_updater
            .update(&ctx.base_repo, &ctx.pull, CommitStatus::Pending, command)
            .await
        {
            ctx.log
                .warn(format!("unable to update commit status: {:#}", err));
        }
    }

    /// Final status update plus the one rendered comment.
    async fn update_pull(
        &self,
        ctx: &CommandContext,
        command: &dyn CommandDescriptor,
        res: &CommandResult,
    ) {
        match res {
            CommandResult::Error { message } => ctx.log.error(message),
            CommandResult::Failure { message } => ctx.log.warn(message),
            CommandResult::Projects { .. } => {}
        }

        let name = command.command_name();
        if let Err(err) = self
            .commit_status_updater
            .update_project_result(ctx, name, res)
            .await
        {
            ctx.log
                .warn(format!("unable to update commit status: {:#}", err));
        }

        let comment = self.renderer.render(
            res,
            name,
            &ctx.log.history().contents(),
            command.is_verbose(),
            command.is_autoplan(),
        );
        self.comment(&ctx.base_repo, ctx.pull.num, &ctx.log, &comment)
            .await;
    }

    async fn comment(&self, repo: &Repo, pull_num: u64, log: &CommandLogger, comment: &str) {
        if let Err(err) = self.vcs_client.create_comment(repo, pull_num, comment).await {
            log.warn(format!("unable to comment on pull request: {:#}", err));
        }
    }

    /// Run one invocation behind a panic boundary. A panic becomes a single
    /// comment plus an error log; it never reaches the caller.
    async fn recover_panics<F>(
        &self,
        repo: &Repo,
        pull_num: u64,
        log: &CommandLogger,
        run: F,
    ) -> RunOutcome
    where
        F: Future<Output = RunOutcome> + Send,
    {
        recovery::install_panic_hook();
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let err = recovery::panic_error(payload);
                self.comment(repo, pull_num, log, &panic_comment(&err))
                    .await;
                log.error(format!("{}\nstack:\n{}", err, err.stack));
                RunOutcome::Panicked(err)
            }
        }
    }
}

fn panic_comment(err: &PanicError) -> String {
    format!(
        "**Error: panic while running command. This is a bug.**\n```\n{}\n{}```",
        err.payload, err.stack
    )
}
