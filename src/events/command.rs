use serde::{Deserialize, Serialize};
use tfpilot_common::{PullRequest, Repo, User};

pub use tfpilot_common::CommandName;

use crate::logging::CommandLogger;

pub const DEFAULT_WORKSPACE: &str = "default";
pub const DEFAULT_REPO_REL_DIR: &str = ".";

/// What the renderer and status updater need to know about the command that
/// triggered a run.
pub trait CommandDescriptor: Send + Sync {
    fn command_name(&self) -> CommandName;
    fn is_verbose(&self) -> bool;
    fn is_autoplan(&self) -> bool;
}

/// Plan triggered automatically on pull request open/update.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoplanCommand;

impl CommandDescriptor for AutoplanCommand {
    fn command_name(&self) -> CommandName {
        CommandName::Plan
    }

    fn is_verbose(&self) -> bool {
        false
    }

    fn is_autoplan(&self) -> bool {
        true
    }
}

/// A plan or apply requested through a pull request comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentCommand {
    pub name: CommandName,
    /// Directory relative to the repo root, `.` when unscoped.
    pub repo_rel_dir: String,
    pub workspace: String,
    /// Extra arguments passed through to the underlying tool.
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub verbose: bool,
}

impl CommentCommand {
    pub fn new(name: CommandName) -> Self {
        Self {
            name,
            repo_rel_dir: DEFAULT_REPO_REL_DIR.to_string(),
            workspace: DEFAULT_WORKSPACE.to_string(),
            flags: Vec::new(),
            verbose: false,
        }
    }

    pub fn with_dir(mut self, repo_rel_dir: impl Into<String>) -> Self {
        self.repo_rel_dir = repo_rel_dir.into();
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl CommandDescriptor for CommentCommand {
    fn command_name(&self) -> CommandName {
        self.name
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn is_autoplan(&self) -> bool {
        false
    }
}

/// One unit of per-project work produced by the project command builder.
#[derive(Debug, Clone)]
pub struct ProjectCommandContext {
    pub base_repo: Repo,
    pub head_repo: Repo,
    pub pull: PullRequest,
    pub user: User,
    pub log: CommandLogger,
    pub repo_rel_dir: String,
    pub workspace: String,
    pub project_name: Option<String>,
    pub comment_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSuccess {
    pub output: String,
    pub lock_url: String,
}

/// Outcome of running one project unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectCommandResult {
    /// The tool or the runner failed unexpectedly.
    Error { message: String },
    /// The command could not run, e.g. the project is locked by another pull.
    Failure { message: String },
    PlanSuccess(PlanSuccess),
    ApplySuccess { output: String },
}

impl ProjectCommandResult {
    pub fn is_successful(&self) -> bool {
        matches!(
            self,
            ProjectCommandResult::PlanSuccess(_) | ProjectCommandResult::ApplySuccess { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectResult {
    pub repo_rel_dir: String,
    pub workspace: String,
    pub result: ProjectCommandResult,
}

/// Outcome of a whole invocation: exactly one of a fatal error, a non-fatal
/// failure, or the per-project results in builder order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandResult {
    Error { message: String },
    Failure { message: String },
    Projects { results: Vec<ProjectResult> },
}

impl CommandResult {
    pub fn error(err: &impl std::fmt::Display) -> Self {
        CommandResult::Error {
            message: err.to_string(),
        }
    }

    pub fn has_errors(&self) -> bool {
        match self {
            CommandResult::Error { .. } | CommandResult::Failure { .. } => true,
            CommandResult::Projects { results } => {
                results.iter().any(|r| !r.result.is_successful())
            }
        }
    }

    pub fn project_results(&self) -> &[ProjectResult] {
        match self {
            CommandResult::Projects { results } => results,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(dir: &str, result: ProjectCommandResult) -> ProjectResult {
        ProjectResult {
            repo_rel_dir: dir.to_string(),
            workspace: DEFAULT_WORKSPACE.to_string(),
            result,
        }
    }

    #[test]
    fn test_comment_command_defaults() {
        let cmd = CommentCommand::new(CommandName::Apply);
        assert_eq!(cmd.repo_rel_dir, ".");
        assert_eq!(cmd.workspace, "default");
        assert!(!cmd.is_verbose());
        assert!(!cmd.is_autoplan());
        assert_eq!(cmd.command_name(), CommandName::Apply);
    }

    #[test]
    fn test_autoplan_is_always_plan() {
        let cmd = AutoplanCommand;
        assert_eq!(cmd.command_name(), CommandName::Plan);
        assert!(cmd.is_autoplan());
    }

    #[test]
    fn test_has_errors() {
        assert!(CommandResult::Error { message: "x".into() }.has_errors());
        assert!(CommandResult::Failure { message: "x".into() }.has_errors());
        assert!(!CommandResult::Projects { results: vec![] }.has_errors());

        let mixed = CommandResult::Projects {
            results: vec![
                project("a", ProjectCommandResult::ApplySuccess { output: "ok".into() }),
                project("b", ProjectCommandResult::Failure { message: "locked".into() }),
            ],
        };
        assert!(mixed.has_errors());
    }

    #[test]
    fn test_project_results_only_for_projects_variant() {
        assert!(CommandResult::Error { message: "x".into() }.project_results().is_empty());
        let ok = CommandResult::Projects {
            results: vec![project("a", ProjectCommandResult::ApplySuccess { output: "".into() })],
        };
        assert_eq!(ok.project_results().len(), 1);
    }

    #[test]
    fn test_result_serializes_with_tags() {
        let result = CommandResult::Projects {
            results: vec![project(
                "a",
                ProjectCommandResult::PlanSuccess(PlanSuccess {
                    output: "+ 1 to add".into(),
                    lock_url: "http://localhost/locks/org%2Frepo%2Fa%2Fdefault".into(),
                }),
            )],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "projects");
        assert_eq!(json["results"][0]["result"]["status"], "plan_success");
    }
}
