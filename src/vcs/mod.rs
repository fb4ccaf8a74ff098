//! Clients for the version-control hosts tfpilot reports back to.

pub mod github;
pub mod gitlab;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tfpilot_common::{CommitStatus, PullRequest, Repo, VcsHostType};

use crate::errors::CommandError;

pub use github::GithubClient;
pub use gitlab::GitlabClient;

/// Identifier attached to every commit status tfpilot posts.
pub const STATUS_CONTEXT: &str = "tfpilot";

const SPLIT_SUFFIX: &str =
    "\n\n**Warning**: Output length greater than max comment size. Continued in next comment.";
const SPLIT_PREFIX: &str = "**Continued from previous comment.**\n";

/// Comment and commit status operations on a pull request.
#[async_trait]
pub trait VcsClient: Send + Sync {
    async fn create_comment(&self, repo: &Repo, pull_num: u64, comment: &str) -> Result<()>;

    async fn update_status(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        state: CommitStatus,
        description: &str,
    ) -> Result<()>;
}

/// Routes each call to the client for the repo's host type.
#[derive(Clone, Default)]
pub struct ClientProxy {
    github: Option<Arc<dyn VcsClient>>,
    gitlab: Option<Arc<dyn VcsClient>>,
}

impl ClientProxy {
    pub fn new(github: Option<Arc<dyn VcsClient>>, gitlab: Option<Arc<dyn VcsClient>>) -> Self {
        Self { github, gitlab }
    }

    fn client_for(&self, host_type: VcsHostType) -> Result<&dyn VcsClient, CommandError> {
        let (client, host) = match host_type {
            VcsHostType::Github => (&self.github, "GitHub"),
            VcsHostType::Gitlab => (&self.gitlab, "GitLab"),
        };
        client
            .as_deref()
            .ok_or(CommandError::Configuration { host })
    }
}

#[async_trait]
impl VcsClient for ClientProxy {
    async fn create_comment(&self, repo: &Repo, pull_num: u64, comment: &str) -> Result<()> {
        self.client_for(repo.vcs_host.host_type)?
            .create_comment(repo, pull_num, comment)
            .await
    }

    async fn update_status(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        state: CommitStatus,
        description: &str,
    ) -> Result<()> {
        self.client_for(repo.vcs_host.host_type)?
            .update_status(repo, pull, state, description)
            .await
    }
}

/// Split a comment that exceeds `max_chars` into several, marking where each
/// part continues. Splits never fall inside a UTF-8 sequence.
pub fn split_comment(comment: &str, max_chars: usize) -> Vec<String> {
    if comment.len() <= max_chars {
        return vec![comment.to_string()];
    }
    let budget = max_chars
        .saturating_sub(SPLIT_PREFIX.len() + SPLIT_SUFFIX.len())
        .max(1);

    let mut parts = Vec::new();
    let mut rest = comment;
    while !rest.is_empty() {
        let mut end = budget.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (chunk, tail) = rest.split_at(end);
        parts.push(chunk.to_string());
        rest = tail;
    }

    let last = parts.len() - 1;
    parts
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut part = String::new();
            if i > 0 {
                part.push_str(SPLIT_PREFIX);
            }
            part.push_str(&chunk);
            if i < last {
                part.push_str(SPLIT_SUFFIX);
            }
            part
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tfpilot_common::VcsHost;

    #[derive(Default)]
    struct RecordingClient {
        comments: Mutex<Vec<(String, u64, String)>>,
    }

    #[async_trait]
    impl VcsClient for RecordingClient {
        async fn create_comment(&self, repo: &Repo, pull_num: u64, comment: &str) -> Result<()> {
            self.comments
                .lock()
                .unwrap()
                .push((repo.full_name.clone(), pull_num, comment.to_string()));
            Ok(())
        }

        async fn update_status(
            &self,
            _repo: &Repo,
            _pull: &PullRequest,
            _state: CommitStatus,
            _description: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_proxy_routes_by_host_type() {
        let github = Arc::new(RecordingClient::default());
        let proxy = ClientProxy::new(Some(github.clone()), None);
        let repo = Repo::new(VcsHost::github(), "org/repo", "").unwrap();

        proxy.create_comment(&repo, 3, "hello").await.unwrap();

        let comments = github.comments.lock().unwrap();
        assert_eq!(comments.as_slice(), &[("org/repo".to_string(), 3, "hello".to_string())]);
    }

    #[tokio::test]
    async fn test_proxy_without_gitlab_client_is_configuration_error() {
        let proxy = ClientProxy::new(Some(Arc::new(RecordingClient::default())), None);
        let repo = Repo::new(VcsHost::gitlab(), "group/sub/repo", "").unwrap();

        let err = proxy.create_comment(&repo, 1, "x").await.unwrap_err();
        assert_eq!(err.to_string(), "tfpilot is not configured to support GitLab");
        assert!(matches!(
            err.downcast_ref::<CommandError>(),
            Some(CommandError::Configuration { .. })
        ));
    }

    #[test]
    fn test_split_comment_short_is_untouched() {
        assert_eq!(split_comment("short", 100), vec!["short".to_string()]);
    }

    #[test]
    fn test_split_comment_marks_continuations() {
        let max = SPLIT_PREFIX.len() + SPLIT_SUFFIX.len() + 10;
        let comment = "a".repeat(25);
        let parts = split_comment(&comment, max);

        assert_eq!(parts.len(), 3);
        assert!(parts[0].starts_with("aaaaaaaaaa"));
        assert!(parts[0].ends_with(SPLIT_SUFFIX));
        assert!(parts[1].starts_with(SPLIT_PREFIX));
        assert!(parts[2].starts_with(SPLIT_PREFIX));
        assert!(!parts[2].ends_with(SPLIT_SUFFIX));
        assert!(parts.iter().all(|p| p.len() <= max));

        let rejoined: String = parts
            .iter()
            .map(|p| p.trim_start_matches(SPLIT_PREFIX).trim_end_matches(SPLIT_SUFFIX))
            .collect();
        assert_eq!(rejoined, comment);
    }

    #[test]
    fn test_split_comment_respects_char_boundaries() {
        let max = SPLIT_PREFIX.len() + SPLIT_SUFFIX.len() + 5;
        let comment = "é".repeat(10);
        let parts = split_comment(&comment, max);
        assert!(parts.len() > 1);
        let rejoined: String = parts
            .iter()
            .map(|p| p.trim_start_matches(SPLIT_PREFIX).trim_end_matches(SPLIT_SUFFIX))
            .collect();
        assert_eq!(rejoined, comment);
    }
}
