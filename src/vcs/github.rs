use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tfpilot_common::{CommitStatus, PullRequest, Repo};

use super::{STATUS_CONTEXT, VcsClient, split_comment};
use crate::events::collaborators::GithubPullGetter;

const GITHUB_API_URL: &str = "https://api.github.com";

/// GitHub rejects comments longer than this many characters.
pub const MAX_COMMENT_LENGTH: usize = 65536;

/// Pull request as returned by `GET /repos/{owner}/{repo}/pulls/{number}`,
/// reduced to the fields tfpilot reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubPullRequest {
    pub number: u64,
    pub html_url: String,
    /// `open` or `closed`.
    pub state: String,
    pub user: GithubUser,
    pub head: GithubBranchRef,
    pub base: GithubBranchRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubUser {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubBranchRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
    /// Null when the head fork has been deleted.
    pub repo: Option<GithubRepository>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubRepository {
    pub full_name: String,
    pub clone_url: String,
}

#[derive(Debug, Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    state: &'static str,
    description: &'a str,
    context: &'static str,
}

/// REST client for github.com or GitHub Enterprise.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    user: String,
    token: String,
}

impl GithubClient {
    /// Client for `hostname`; anything other than `github.com` is treated as
    /// an Enterprise install serving its API under `/api/v3`.
    pub fn new(hostname: &str, user: &str, token: &str) -> Result<Self> {
        let api_url = if hostname == "github.com" {
            GITHUB_API_URL.to_string()
        } else {
            format!("https://{}/api/v3", hostname)
        };
        Self::with_api_url(&api_url, user, token)
    }

    pub fn with_api_url(api_url: &str, user: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("tfpilot")
            .build()
            .context("Failed to build GitHub HTTP client")?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            token: token.to_string(),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

fn status_state(state: CommitStatus) -> &'static str {
    match state {
        CommitStatus::Pending => "pending",
        CommitStatus::Success => "success",
        CommitStatus::Failed => "failure",
    }
}

#[async_trait]
impl VcsClient for GithubClient {
    async fn create_comment(&self, repo: &Repo, pull_num: u64, comment: &str) -> Result<()> {
        let url = self.url(&format!("/repos/{}/issues/{}/comments", repo.full_name, pull_num));
        for part in split_comment(comment, MAX_COMMENT_LENGTH) {
            self.http
                .post(&url)
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json")
                .json(&CommentBody { body: &part })
                .send()
                .await
                .context("Failed to send comment request to GitHub")?
                .error_for_status()
                .context("GitHub comments API returned error status")?;
        }
        Ok(())
    }

    async fn update_status(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        state: CommitStatus,
        description: &str,
    ) -> Result<()> {
        let url = self.url(&format!("/repos/{}/statuses/{}", repo.full_name, pull.head_commit));
        self.http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&StatusBody {
                state: status_state(state),
                description,
                context: STATUS_CONTEXT,
            })
            .send()
            .await
            .context("Failed to send status request to GitHub")?
            .error_for_status()
            .context("GitHub statuses API returned error status")?;
        Ok(())
    }
}

#[async_trait]
impl GithubPullGetter for GithubClient {
    async fn get_pull_request(&self, repo: &Repo, pull_num: u64) -> Result<GithubPullRequest> {
        let url = self.url(&format!("/repos/{}/pulls/{}", repo.full_name, pull_num));
        self.http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .context("Failed to send pull request request to GitHub")?
            .error_for_status()
            .context("GitHub pulls API returned error status")?
            .json::<GithubPullRequest>()
            .await
            .context("Failed to parse pull request response from GitHub")
    }
}
