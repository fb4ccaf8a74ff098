//! Command orchestration for pull request events.
//!
//! A trigger (autoplan or a comment command) becomes a [`CommandContext`],
//! which [`DefaultCommandRunner`] validates, expands into per-project units
//! through a [`ProjectCommandBuilder`], executes through a
//! [`ProjectCommandRunner`] and reports back as one comment plus commit
//! statuses. The runner makes no locking decisions itself: builders and
//! project runners consult the [`Locker`](crate::locking::Locker) and
//! [`WorkingDirLocker`].
//!
//! Manual lock deletion ([`DeleteLockCommand`]) and pull request cleanup
//! ([`PullClosedExecutor`]) run independently of any in-flight command.

pub mod collaborators;
pub mod command;
pub mod command_runner;
pub mod commit_status;
pub mod context;
pub mod delete_lock;
pub mod event_parser;
pub mod pull_closed;
pub mod working_dir;
pub mod working_dir_locker;

pub use collaborators::{
    CommitStatusUpdater, EventParser, GithubPullGetter, GitlabMergeRequestGetter, ParsedPull,
    ProjectCommandBuilder, ProjectCommandRunner, Renderer,
};
pub use command::{
    AutoplanCommand, CommandDescriptor, CommandName, CommandResult, CommentCommand, PlanSuccess,
    ProjectCommandContext, ProjectCommandResult, ProjectResult,
};
pub use command_runner::{CommandRunner, DefaultCommandRunner, RunOutcome};
pub use commit_status::DefaultCommitStatusUpdater;
pub use context::CommandContext;
pub use delete_lock::DeleteLockCommand;
pub use event_parser::DefaultEventParser;
pub use pull_closed::PullClosedExecutor;
pub use working_dir::{FileWorkspace, WorkingDir};
pub use working_dir_locker::{WorkingDirLock, WorkingDirLocker};
