use anyhow::{Context, Result, anyhow};
use tfpilot_common::{PullRequest, PullState, Repo, VcsHost, VcsHostType};

use super::collaborators::{EventParser, ParsedPull};
use crate::vcs::github::{GithubPullRequest, GithubRepository};
use crate::vcs::gitlab::GitlabMergeRequest;

/// Converts REST API payloads into domain values.
#[derive(Debug, Clone)]
pub struct DefaultEventParser {
    github_hostname: String,
}

impl DefaultEventParser {
    pub fn new(github_hostname: impl Into<String>) -> Self {
        Self {
            github_hostname: github_hostname.into(),
        }
    }

    fn github_repo(&self, repo: &GithubRepository) -> Result<Repo> {
        let host = VcsHost {
            hostname: self.github_hostname.clone(),
            host_type: VcsHostType::Github,
        };
        Repo::new(host, &repo.full_name, &repo.clone_url)
            .with_context(|| format!("parsing repository {:?}", repo.full_name))
    }
}

impl Default for DefaultEventParser {
    fn default() -> Self {
        Self::new(VcsHost::github().hostname)
    }
}

impl EventParser for DefaultEventParser {
    fn parse_github_pull(&self, pull: &GithubPullRequest) -> Result<ParsedPull> {
        let base = pull
            .base
            .repo
            .as_ref()
            .ok_or_else(|| anyhow!("pull request #{} has no base repository", pull.number))?;
        let head = pull
            .head
            .repo
            .as_ref()
            .ok_or_else(|| anyhow!("head repository of pull request #{} was deleted", pull.number))?;
        let base_repo = self.github_repo(base)?;
        let head_repo = self.github_repo(head)?;

        let state = if pull.state == "open" {
            PullState::Open
        } else {
            PullState::Closed
        };
        Ok(ParsedPull {
            pull: PullRequest {
                num: pull.number,
                head_commit: pull.head.sha.clone(),
                url: pull.html_url.clone(),
                head_branch: pull.head.ref_name.clone(),
                base_branch: pull.base.ref_name.clone(),
                author: pull.user.login.clone(),
                state,
                base_repo: Some(base_repo.clone()),
            },
            base_repo,
            head_repo,
        })
    }

    fn parse_gitlab_merge_request(&self, mr: &GitlabMergeRequest, base_repo: &Repo) -> PullRequest {
        let state = if mr.state == "opened" {
            PullState::Open
        } else {
            PullState::Closed
        };
        PullRequest {
            num: mr.iid,
            head_commit: mr.sha.clone(),
            url: mr.web_url.clone(),
            head_branch: mr.source_branch.clone(),
            base_branch: mr.target_branch.clone(),
            author: mr.author.username.clone(),
            state,
            base_repo: Some(base_repo.clone()),
        }
    }
}
