//! Shared domain types for tfpilot.
//!
//! These types describe the version-control side of the world (repositories,
//! hosts, pull requests, users) and the logical lock that ties a project and
//! workspace to the pull request currently holding it. They are persisted by
//! the lock store and exchanged with every collaborator, so they carry no
//! behaviour beyond validation and key derivation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while constructing domain values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("repo full name cannot be empty")]
    EmptyFullName,

    #[error("invalid repo full name {full_name:?}: {reason}")]
    InvalidFullName { full_name: String, reason: &'static str },

    #[error("unknown VCS host type {0:?}")]
    UnknownHostType(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VcsHostType {
    Github,
    Gitlab,
}

impl VcsHostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
        }
    }
}

impl fmt::Display for VcsHostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VcsHostType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            _ => Err(ModelError::UnknownHostType(s.to_string())),
        }
    }
}

/// A VCS installation, e.g. `github.com` or a self-hosted GitLab.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VcsHost {
    pub hostname: String,
    pub host_type: VcsHostType,
}

impl VcsHost {
    pub fn github() -> Self {
        Self {
            hostname: "github.com".to_string(),
            host_type: VcsHostType::Github,
        }
    }

    pub fn gitlab() -> Self {
        Self {
            hostname: "gitlab.com".to_string(),
            host_type: VcsHostType::Gitlab,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Repo {
    /// `owner/name`, or `group/subgroup/name` on GitLab.
    pub full_name: String,
    pub owner: String,
    pub name: String,
    pub clone_url: String,
    pub vcs_host: VcsHost,
}

impl Repo {
    /// Build a repo from its full name, splitting owner and name on the last `/`.
    pub fn new(
        vcs_host: VcsHost,
        full_name: &str,
        clone_url: &str,
    ) -> Result<Self, ModelError> {
        if full_name.is_empty() {
            return Err(ModelError::EmptyFullName);
        }
        let invalid = |reason| ModelError::InvalidFullName {
            full_name: full_name.to_string(),
            reason,
        };
        if full_name.starts_with('/') || full_name.ends_with('/') {
            return Err(invalid("cannot start or end with a slash"));
        }
        if full_name.contains("//") {
            return Err(invalid("cannot contain consecutive slashes"));
        }
        let (owner, name) = full_name
            .rsplit_once('/')
            .ok_or_else(|| invalid("must be in the form owner/name"))?;

        Ok(Self {
            full_name: full_name.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            clone_url: clone_url.to_string(),
            vcs_host,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PullState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequest {
    pub num: u64,
    pub head_commit: String,
    pub url: String,
    pub head_branch: String,
    pub base_branch: String,
    pub author: String,
    pub state: PullState,
    /// Missing on locks persisted before the base repo was recorded.
    #[serde(default)]
    pub base_repo: Option<Repo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct User {
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// A directory inside a repository that is planned and applied as one unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Project {
    pub repo_full_name: String,
    /// Path relative to the repo root, `.` for the root itself.
    pub path: String,
}

impl Project {
    pub fn new(repo_full_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repo_full_name: repo_full_name.into(),
            path: path.into(),
        }
    }
}

/// Logical claim on a project + workspace, held by one pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lock {
    pub project: Project,
    pub workspace: String,
    pub pull: PullRequest,
    pub user: User,
    pub acquired_at: DateTime<Utc>,
}

impl Lock {
    pub fn key(&self) -> String {
        lock_key(&self.project, &self.workspace)
    }

    /// Whether pull `pull_num` of `repo_full_name` owns this lock.
    pub fn is_held_by(&self, repo_full_name: &str, pull_num: u64) -> bool {
        self.project.repo_full_name == repo_full_name && self.pull.num == pull_num
    }
}

/// Deterministic lock id for a project + workspace pair:
/// `<owner>/<name>/<path>/<workspace>`.
///
/// `/` and `%` inside the owner, the name and the workspace are
/// percent-escaped, so nested GitLab groups (`group/sub/name`) cannot collide
/// with a shallower repo whose project path absorbs the extra segment. For an
/// ordinary `owner/name` repo the id reads `owner/name/path/workspace`.
pub fn lock_key(project: &Project, workspace: &str) -> String {
    let (owner, name) = project
        .repo_full_name
        .rsplit_once('/')
        .unwrap_or(("", project.repo_full_name.as_str()));
    format!(
        "{}/{}/{}/{}",
        escape_segment(owner),
        escape_segment(name),
        project.path,
        escape_segment(workspace)
    )
}

fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('/', "%2F")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    Pending,
    Success,
    Failed,
}

impl CommitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandName {
    Plan,
    Apply,
}

impl CommandName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Apply => "apply",
        }
    }

    /// Capitalised form used in commit status descriptions.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Plan => "Plan",
            Self::Apply => "Apply",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(Self::Plan),
            "apply" => Ok(Self::Apply),
            _ => Err(format!("Invalid command: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_new_splits_owner_and_name() {
        let repo = Repo::new(VcsHost::github(), "org/infra", "https://github.com/org/infra.git")
            .unwrap();
        assert_eq!(repo.owner, "org");
        assert_eq!(repo.name, "infra");
    }

    #[test]
    fn test_repo_new_supports_nested_gitlab_groups() {
        let repo = Repo::new(VcsHost::gitlab(), "group/sub/infra", "").unwrap();
        assert_eq!(repo.owner, "group/sub");
        assert_eq!(repo.name, "infra");
    }

    #[test]
    fn test_repo_new_rejects_malformed_names() {
        assert_eq!(
            Repo::new(VcsHost::github(), "", ""),
            Err(ModelError::EmptyFullName)
        );
        for bad in ["noslash", "/org/repo", "org/repo/", "org//repo"] {
            assert!(
                matches!(
                    Repo::new(VcsHost::github(), bad, ""),
                    Err(ModelError::InvalidFullName { .. })
                ),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_lock_key_is_deterministic() {
        let project = Project::new("org/repo", ".");
        assert_eq!(lock_key(&project, "default"), "org/repo/./default");
        assert_eq!(lock_key(&project, "default"), lock_key(&project, "default"));
    }

    #[test]
    fn test_lock_key_keeps_nested_groups_apart() {
        let shallow = lock_key(&Project::new("group/sub", "infra/vpc"), "default");
        let nested = lock_key(&Project::new("group/sub/infra", "vpc"), "default");
        assert_eq!(shallow, "group/sub/infra/vpc/default");
        assert_eq!(nested, "group%2Fsub/infra/vpc/default");
        assert_ne!(shallow, nested);
    }

    #[test]
    fn test_is_held_by_requires_same_repo_and_pull() {
        let lock = Lock {
            project: Project::new("group/sub", "infra/vpc"),
            workspace: "default".to_string(),
            pull: PullRequest {
                num: 5,
                head_commit: "abc".to_string(),
                url: String::new(),
                head_branch: "feature".to_string(),
                base_branch: "main".to_string(),
                author: "alice".to_string(),
                state: PullState::Open,
                base_repo: None,
            },
            user: User::new("alice"),
            acquired_at: Utc::now(),
        };
        assert!(lock.is_held_by("group/sub", 5));
        assert!(!lock.is_held_by("group/sub/infra", 5));
        assert!(!lock.is_held_by("group/sub", 6));
    }

    #[test]
    fn test_pull_request_without_base_repo_deserializes() {
        let json = r#"{
            "num": 3,
            "head_commit": "abc",
            "url": "https://github.com/org/repo/pull/3",
            "head_branch": "feature",
            "base_branch": "main",
            "author": "alice",
            "state": "open"
        }"#;
        let pull: PullRequest = serde_json::from_str(json).unwrap();
        assert!(pull.base_repo.is_none());
        assert_eq!(pull.state, PullState::Open);
    }

    #[test]
    fn test_host_type_round_trips_through_str() {
        assert_eq!("GitLab".parse::<VcsHostType>().unwrap(), VcsHostType::Gitlab);
        assert!("bitbucket".parse::<VcsHostType>().is_err());
    }
}
