use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tfpilot_common::{CommitStatus, PullRequest, Repo};

use super::{STATUS_CONTEXT, VcsClient, split_comment};
use crate::events::collaborators::GitlabMergeRequestGetter;

/// GitLab notes are capped at 1,000,000 characters.
pub const MAX_COMMENT_LENGTH: usize = 1_000_000;

/// Merge request as returned by
/// `GET /projects/{id}/merge_requests/{iid}`, reduced to what tfpilot reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitlabMergeRequest {
    pub iid: u64,
    pub web_url: String,
    /// `opened`, `closed`, `locked` or `merged`.
    pub state: String,
    pub sha: String,
    pub source_branch: String,
    pub target_branch: String,
    pub author: GitlabUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitlabUser {
    pub username: String,
}

#[derive(Debug, Serialize)]
struct NoteBody<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    state: &'static str,
    description: &'a str,
    context: &'static str,
    #[serde(rename = "ref")]
    ref_name: &'a str,
}

/// REST client for gitlab.com or a self-hosted GitLab.
#[derive(Debug, Clone)]
pub struct GitlabClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GitlabClient {
    pub fn new(hostname: &str, token: &str) -> Result<Self> {
        Self::with_base_url(&format!("https://{}", hostname), token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("tfpilot")
            .build()
            .context("Failed to build GitLab HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// URL under `/api/v4/projects/{id}` where `id` is the encoded full name.
    fn project_url(&self, repo_full_name: &str, rest: &str) -> String {
        format!(
            "{}/api/v4/projects/{}{}",
            self.base_url,
            urlencoding::encode(repo_full_name),
            rest
        )
    }
}

fn status_state(state: CommitStatus) -> &'static str {
    match state {
        CommitStatus::Pending => "pending",
        CommitStatus::Success => "success",
        CommitStatus::Failed => "failed",
    }
}

#[async_trait]
impl VcsClient for GitlabClient {
    async fn create_comment(&self, repo: &Repo, pull_num: u64, comment: &str) -> Result<()> {
        let url = self.project_url(
            &repo.full_name,
            &format!("/merge_requests/{}/notes", pull_num),
        );
        for part in split_comment(comment, MAX_COMMENT_LENGTH) {
            self.http
                .post(&url)
                .header("PRIVATE-TOKEN", &self.token)
                .json(&NoteBody { body: &part })
                .send()
                .await
                .context("Failed to send note request to GitLab")?
                .error_for_status()
                .context("GitLab notes API returned error status")?;
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
        let url = self.project_url(&repo.full_name, &format!("/statuses/{}", pull.head_commit));
        self.http
            .post(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&StatusBody {
                state: status_state(state),
                description,
                context: STATUS_CONTEXT,
                ref_name: &pull.head_branch,
            })
            .send()
            .await
            .context("Failed to send status request to GitLab")?
            .error_for_status()
            .context("GitLab statuses API returned error status")?;
        Ok(())
    }
}

#[async_trait]
impl GitlabMergeRequestGetter for GitlabClient {
    async fn get_merge_request(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<GitlabMergeRequest> {
        let url = self.project_url(repo_full_name, &format!("/merge_requests/{}", pull_num));
        self.http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .context("Failed to send merge request request to GitLab")?
            .error_for_status()
            .context("GitLab merge requests API returned error status")?
            .json::<GitlabMergeRequest>()
            .await
            .context("Failed to parse merge request response from GitLab")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::tests::pull;
    use serde_json::json;
    use tfpilot_common::VcsHost;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo() -> Repo {
        Repo::new(VcsHost::gitlab(), "group/sub/repo", "").unwrap()
    }

    #[tokio::test]
    async fn test_create_comment_uses_encoded_project_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/group%2Fsub%2Frepo/merge_requests/3/notes"))
            .and(header("private-token", "secret"))
            .and(body_json(json!({ "body": "Ran Apply" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitlabClient::with_base_url(&server.uri(), "secret").unwrap();
        client.create_comment(&repo(), 3, "Ran Apply").await.unwrap();
    }

    #[tokio::test]
    async fn test_update_status_sends_ref_and_failed_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/group%2Fsub%2Frepo/statuses/sha3"))
            .and(body_json(json!({
                "state": "failed",
                "description": "Apply Failed",
                "context": "tfpilot",
                "ref": "feature-3",
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitlabClient::with_base_url(&server.uri(), "secret").unwrap();
        client
            .update_status(&repo(), &pull("group/sub/repo", 3), CommitStatus::Failed, "Apply Failed")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_merge_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/group%2Fsub%2Frepo/merge_requests/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "iid": 3,
                "web_url": "https://gitlab.com/group/sub/repo/merge_requests/3",
                "state": "opened",
                "sha": "abc",
                "source_branch": "feature",
                "target_branch": "main",
                "author": { "username": "bob" },
                "title": "ignored"
            })))
            .mount(&server)
            .await;

        let client = GitlabClient::with_base_url(&server.uri(), "secret").unwrap();
        let mr = client.get_merge_request("group/sub/repo", 3).await.unwrap();
        assert_eq!(mr.iid, 3);
        assert_eq!(mr.state, "opened");
        assert_eq!(mr.author.username, "bob");
    }

    #[tokio::test]
    async fn test_missing_merge_request_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitlabClient::with_base_url(&server.uri(), "secret").unwrap();
        assert!(client.get_merge_request("group/sub/repo", 3).await.is_err());
    }
}
