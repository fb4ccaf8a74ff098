//! Logical project/workspace locks.
//!
//! A lock claims one `(repository, project path, workspace)` key for a pull
//! request across the whole plan → apply lifecycle. It is independent of the
//! filesystem; see [`crate::events::working_dir_locker`] for the checkout-level
//! lock.
//!
//! ```text
//!   Locker (async, used by builders/runners/HTTP)
//!     └─ LockManager ── spawn_blocking ──> Backend (sync, atomic per call)
//!                                            └─ SqliteBackend
//! ```

pub mod sqlite;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tfpilot_common::{Lock, Project, PullRequest, User};

pub use sqlite::SqliteBackend;

use crate::errors::LockError;

/// Outcome of a backend acquisition attempt.
#[derive(Debug, Clone)]
pub struct TryLockResult {
    /// True if the caller now holds the lock, either freshly inserted or
    /// already held by the same pull request.
    pub acquired: bool,
    /// The lock stored under the key after the attempt.
    pub current: Lock,
}

/// Transactional key-value store for locks.
///
/// Each method must be atomic against the store: `try_lock` in particular
/// performs the existence check, the same-pull check and the insert as one
/// operation.
pub trait Backend: Send + Sync {
    fn try_lock(&self, lock: &Lock) -> Result<TryLockResult, LockError>;
    fn unlock(&self, id: &str) -> Result<Option<Lock>, LockError>;
    fn list(&self) -> Result<Vec<Lock>, LockError>;
    fn get_lock(&self, id: &str) -> Result<Option<Lock>, LockError>;
    fn unlock_by_pull(&self, repo_full_name: &str, pull_num: u64) -> Result<Vec<Lock>, LockError>;
}

/// Result of [`Locker::try_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The caller holds the lock. Re-acquiring from the same pull request
    /// returns the originally stored lock.
    Acquired { key: String, lock: Lock },
    /// Another pull request holds the key.
    Conflict { key: String, holder: Lock },
}

impl LockOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired { .. })
    }

    pub fn key(&self) -> &str {
        match self {
            LockOutcome::Acquired { key, .. } | LockOutcome::Conflict { key, .. } => key,
        }
    }

    /// User-facing explanation for a conflict, naming the holder.
    pub fn conflict_message(&self) -> Option<String> {
        match self {
            LockOutcome::Acquired { .. } => None,
            LockOutcome::Conflict { holder, .. } => Some(format!(
                "This project is currently locked by an unapplied plan from pull #{}. To continue, delete the lock from #{} or apply that plan and merge the pull request.\n\nOnce the lock is released, comment `plan` here to re-plan.\n\nLock holder: {}",
                holder.pull.num, holder.pull.num, holder.pull.url
            )),
        }
    }
}

/// Async lock API consumed by project command builders/runners and the HTTP
/// lock routes.
#[async_trait]
pub trait Locker: Send + Sync {
    async fn try_lock(
        &self,
        project: Project,
        workspace: &str,
        pull: PullRequest,
        user: User,
    ) -> Result<LockOutcome>;

    async fn unlock(&self, id: &str) -> Result<Option<Lock>>;

    async fn list(&self) -> Result<Vec<Lock>>;

    async fn unlock_by_pull(&self, repo_full_name: &str, pull_num: u64) -> Result<Vec<Lock>>;

    async fn get_lock(&self, id: &str) -> Result<Option<Lock>>;
}

/// Default [`Locker`]: derives keys and runs backend calls on tokio's blocking
/// pool so synchronous store I/O never ties up async workers.
#[derive(Clone)]
pub struct LockManager {
    backend: Arc<dyn Backend>,
}

impl LockManager {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn Backend) -> Result<R, LockError> + Send + 'static,
        R: Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let result = tokio::task::spawn_blocking(move || f(backend.as_ref()))
            .await
            .context("Lock store task panicked")?;
        Ok(result?)
    }
}

#[async_trait]
impl Locker for LockManager {
    async fn try_lock(
        &self,
        project: Project,
        workspace: &str,
        pull: PullRequest,
        user: User,
    ) -> Result<LockOutcome> {
        let lock = Lock {
            project,
            workspace: workspace.to_string(),
            pull,
            user,
            acquired_at: Utc::now(),
        };
        let key = lock.key();
        let result = self
            .call(move |backend| backend.try_lock(&lock))
            .await
            .with_context(|| format!("acquiring lock {}", key))?;

        if result.acquired {
            tracing::debug!(lock = %key, pull = result.current.pull.num, "lock acquired");
            Ok(LockOutcome::Acquired {
                key,
                lock: result.current,
            })
        } else {
            tracing::info!(lock = %key, holder = result.current.pull.num, "lock held by another pull request");
            Ok(LockOutcome::Conflict {
                key,
                holder: result.current,
            })
        }
    }

    async fn unlock(&self, id: &str) -> Result<Option<Lock>> {
        let key = id.to_string();
        let removed = self
            .call(move |backend| backend.unlock(&key))
            .await
            .with_context(|| format!("releasing lock {}", id))?;
        if removed.is_some() {
            tracing::info!(lock = %id, "lock released");
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<Lock>> {
        self.call(|backend| backend.list()).await.context("listing locks")
    }

    async fn unlock_by_pull(&self, repo_full_name: &str, pull_num: u64) -> Result<Vec<Lock>> {
        let repo = repo_full_name.to_string();
        let removed = self
            .call(move |backend| backend.unlock_by_pull(&repo, pull_num))
            .await
            .with_context(|| format!("releasing locks for {}#{}", repo_full_name, pull_num))?;
        tracing::info!(repo = %repo_full_name, pull = pull_num, count = removed.len(), "released locks for pull request");
        Ok(removed)
    }

    async fn get_lock(&self, id: &str) -> Result<Option<Lock>> {
        let key = id.to_string();
        self.call(move |backend| backend.get_lock(&key))
            .await
            .with_context(|| format!("reading lock {}", id))
    }
}
