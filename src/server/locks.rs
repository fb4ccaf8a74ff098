use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tfpilot_common::Lock;

use super::services::Services;
use crate::errors::LockIdError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub services: Services,
    pub version: String,
}

pub type SharedState = Arc<AppState>;

// ── Response payload types ────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockDetail {
    pub lock_key: String,
    pub lock_key_encoded: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub pull_request_link: String,
    pub locked_by: String,
    pub workspace: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockSummary {
    pub id: String,
    pub id_encoded: String,
    pub repo_full_name: String,
    pub path: String,
    pub workspace: String,
    pub pull_num: u64,
    pub pull_url: String,
    pub locked_by: String,
    pub acquired_at: DateTime<Utc>,
}

impl From<&Lock> for LockSummary {
    fn from(lock: &Lock) -> Self {
        let id = lock.key();
        Self {
            id_encoded: urlencoding::encode(&id).into_owned(),
            id,
            repo_full_name: lock.project.repo_full_name.clone(),
            path: lock.project.path.clone(),
            workspace: lock.workspace.clone(),
            pull_num: lock.pull.num,
            pull_url: lock.pull.url.clone(),
            locked_by: lock.pull.author.clone(),
            acquired_at: lock.acquired_at,
        }
    }
}

// ── Error handling ────────────────────────────────────────────────────

/// Error responses, logged at a level matching their status class.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => {
                tracing::info!("{}", msg);
                (StatusCode::NOT_FOUND, msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("{}", msg);
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!("{}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<LockIdError> for ApiError {
    fn from(err: LockIdError) -> Self {
        match err {
            LockIdError::Missing => ApiError::BadRequest("No lock id in request".to_string()),
            other => ApiError::BadRequest(format!("Invalid lock id: {}", other)),
        }
    }
}

// ── Lock id decoding ──────────────────────────────────────────────────

/// Percent-decode a lock id taken from the raw request path.
///
/// Every `%` must start a two-digit hex escape and the decoded bytes must be
/// UTF-8. `+` is left as is.
pub fn decode_lock_id(raw: &str) -> Result<String, LockIdError> {
    if raw.is_empty() {
        return Err(LockIdError::Missing);
    }
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3);
            if !escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)) {
                let end = (i + 3).min(bytes.len());
                return Err(LockIdError::InvalidEscape(
                    String::from_utf8_lossy(&bytes[i..end]).into_owned(),
                ));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    urlencoding::decode(raw)
        .map(|id| id.into_owned())
        .map_err(|_| LockIdError::InvalidUtf8)
}

/// The still-encoded id segment of a `/locks/{id}` request.
fn raw_lock_id(uri: &Uri) -> &str {
    uri.path().strip_prefix("/locks/").unwrap_or("")
}

/// Split a repo full name on its last `/`. Names without one keep the whole
/// name as owner.
fn split_repo_full_name(full_name: &str) -> (String, String) {
    match full_name.rsplit_once('/') {
        Some((owner, name)) => (owner.to_string(), name.to_string()),
        None => (full_name.to_string(), String::new()),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_locks(
    State(state): State<SharedState>,
) -> Result<Json<Vec<LockSummary>>, ApiError> {
    let locks = state
        .services
        .locker
        .list()
        .await
        .map_err(|e| ApiError::Internal(format!("Failed listing locks: {:#}", e)))?;
    Ok(Json(locks.iter().map(LockSummary::from).collect()))
}

pub async fn get_lock(
    State(state): State<SharedState>,
    uri: Uri,
) -> Result<Json<LockDetail>, ApiError> {
    let encoded = raw_lock_id(&uri);
    let id = decode_lock_id(encoded)?;
    let lock = state
        .services
        .locker
        .get_lock(&id)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed getting lock: {:#}", e)))?
        .ok_or_else(|| ApiError::NotFound(format!("No lock found at id {:?}", id)))?;

    let (repo_owner, repo_name) = split_repo_full_name(&lock.project.repo_full_name);
    Ok(Json(LockDetail {
        lock_key: id,
        lock_key_encoded: encoded.to_string(),
        repo_owner,
        repo_name,
        pull_request_link: lock.pull.url,
        locked_by: lock.pull.author,
        workspace: lock.workspace,
        version: state.version.clone(),
    }))
}

pub async fn delete_lock(
    State(state): State<SharedState>,
    uri: Uri,
) -> Result<(StatusCode, String), ApiError> {
    let encoded = raw_lock_id(&uri);
    let id = decode_lock_id(encoded)?;
    match state.services.delete_lock_command().delete_lock(&id).await {
        Ok(Some(_)) => {
            let message = format!("Deleted lock id {:?}", encoded);
            tracing::info!("{}", message);
            Ok((StatusCode::OK, message))
        }
        Ok(None) => Err(ApiError::NotFound(format!("No lock found at id {:?}", id))),
        Err(err) => Err(ApiError::Internal(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WorkingDir;
    use crate::events::delete_lock::tests::{CommentRecorder, Fixture, fixture};
    use crate::locking::tests::lock_for;
    use crate::locking::{Backend, LockManager};
    use tfpilot_common::VcsHost;
    use crate::server::router::build_router;
    use axum::Router;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(vcs: CommentRecorder) -> (Router, Fixture) {
        let f = fixture(vcs);
        let state = Arc::new(AppState {
            services: Services {
                locker: Arc::new(LockManager::new(f.backend.clone())),
                working_dir: f.working_dir.clone(),
                working_dir_locker: f.working_dir_locker.clone(),
                vcs_client: f.vcs.clone(),
                github: None,
                gitlab: None,
                github_hostname: VcsHost::github().hostname,
                allow_fork_prs: false,
            },
            version: "0.1.0".to_string(),
        });
        (build_router(state), f)
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    const LOCK_URI: &str = "/locks/org%2Frepo%2Fmodules%2Fvpc%2Fstaging";

    #[test]
    fn test_decode_lock_id() {
        assert_eq!(decode_lock_id("org%2Frepo%2F.%2Fdefault").unwrap(), "org/repo/./default");
        assert_eq!(decode_lock_id("a+b").unwrap(), "a+b");
        assert_eq!(decode_lock_id(""), Err(LockIdError::Missing));
        assert_eq!(
            decode_lock_id("org%2Frepo%zz"),
            Err(LockIdError::InvalidEscape("%zz".into()))
        );
        assert_eq!(decode_lock_id("org%2"), Err(LockIdError::InvalidEscape("%2".into())));
        assert_eq!(decode_lock_id("%ff%fe"), Err(LockIdError::InvalidUtf8));
    }

    #[test]
    fn test_split_repo_full_name() {
        assert_eq!(split_repo_full_name("org/repo"), ("org".into(), "repo".into()));
        assert_eq!(
            split_repo_full_name("group/sub/repo"),
            ("group/sub".into(), "repo".into())
        );
        assert_eq!(split_repo_full_name("solo"), ("solo".into(), "".into()));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _f) = test_app(CommentRecorder::default());
        let (status, body) = send(app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_get_lock_detail() {
        let (app, f) = test_app(CommentRecorder::default());
        f.backend
            .try_lock(&lock_for("org/repo", "modules/vpc", "staging", 5))
            .unwrap();

        let (status, body) = send(app, "GET", LOCK_URI).await;

        assert_eq!(status, StatusCode::OK);
        let detail: LockDetail = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            detail,
            LockDetail {
                lock_key: "org/repo/modules/vpc/staging".into(),
                lock_key_encoded: "org%2Frepo%2Fmodules%2Fvpc%2Fstaging".into(),
                repo_owner: "org".into(),
                repo_name: "repo".into(),
                pull_request_link: "https://github.com/org/repo/pull/5".into(),
                locked_by: "alice".into(),
                workspace: "staging".into(),
                version: "0.1.0".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_get_unknown_lock_is_404() {
        let (app, _f) = test_app(CommentRecorder::default());
        let (status, body) = send(app, "GET", LOCK_URI).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "No lock found at id \"org/repo/modules/vpc/staging\"");
    }

    #[tokio::test]
    async fn test_malformed_id_is_400_on_both_routes() {
        for method in ["GET", "DELETE"] {
            let (app, f) = test_app(CommentRecorder::default());
            f.backend.try_lock(&lock_for("org/repo", ".", "default", 5)).unwrap();

            let (status, body) = send(app, method, "/locks/org%2Frepo%zz").await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", method);
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert!(json["error"].as_str().unwrap().starts_with("Invalid lock id"));
            assert_eq!(f.backend.list().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_delete_lock() {
        let (app, f) = test_app(CommentRecorder::default());
        let lock = lock_for("org/repo", "modules/vpc", "staging", 5);
        f.backend.try_lock(&lock).unwrap();

        let (status, body) = send(app, "DELETE", LOCK_URI).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "Deleted lock id \"org%2Frepo%2Fmodules%2Fvpc%2Fstaging\""
        );
        assert!(f.backend.get_lock(&lock.key()).unwrap().is_none());
        assert_eq!(f.vcs.comments.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_lock_without_base_repo_skips_cleanup() {
        let (app, f) = test_app(CommentRecorder::default());
        let mut lock = lock_for("org/repo", "modules/vpc", "staging", 5);
        let repo = lock.pull.base_repo.take().unwrap();
        f.backend.try_lock(&lock).unwrap();
        let dir = f.working_dir.get_working_dir(&repo, &lock.pull, "staging");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("staging.tfplan"), "plan").unwrap();

        let (status, _) = send(app, "DELETE", LOCK_URI).await;

        assert_eq!(status, StatusCode::OK);
        assert!(f.backend.get_lock(&lock.key()).unwrap().is_none());
        assert!(f.vcs.comments.lock().unwrap().is_empty());
        assert!(dir.join("staging.tfplan").exists());
    }

    #[tokio::test]
    async fn test_delete_unknown_lock_is_404() {
        let (app, f) = test_app(CommentRecorder::default());
        let (status, _) = send(app, "DELETE", LOCK_URI).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(f.vcs.comments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_comment_failure_is_500() {
        let (app, f) = test_app(CommentRecorder {
            fail: true,
            ..Default::default()
        });
        let lock = lock_for("org/repo", "modules/vpc", "staging", 5);
        f.backend.try_lock(&lock).unwrap();

        let (status, body) = send(app, "DELETE", LOCK_URI).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("failed commenting on pull request"));
        assert!(f.backend.get_lock(&lock.key()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_locks() {
        let (app, f) = test_app(CommentRecorder::default());
        f.backend.try_lock(&lock_for("org/repo", ".", "default", 5)).unwrap();
        f.backend.try_lock(&lock_for("org/repo", "prod", "east", 6)).unwrap();

        let (status, body) = send(app, "GET", "/locks").await;

        assert_eq!(status, StatusCode::OK);
        let locks: Vec<LockSummary> = serde_json::from_slice(&body).unwrap();
        assert_eq!(locks.len(), 2);
        assert_eq!(locks[0].id, "org/repo/./default");
        assert_eq!(locks[0].id_encoded, "org%2Frepo%2F.%2Fdefault");
        assert_eq!(locks[1].pull_num, 6);
    }
}
