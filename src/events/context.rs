use tfpilot_common::{PullRequest, Repo, User};

use crate::logging::CommandLogger;

/// Everything one command invocation knows about who asked and where.
///
/// Built once per invocation and dropped when it ends; the logger's history
/// is never shared with another invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub user: User,
    pub log: CommandLogger,
    pub pull: PullRequest,
    pub base_repo: Repo,
    pub head_repo: Repo,
}

impl CommandContext {
    /// Head and base repositories belong to different owners.
    pub fn is_fork(&self) -> bool {
        self.head_repo.owner != self.base_repo.owner
    }
}
