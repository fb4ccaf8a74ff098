use std::sync::Arc;

use tfpilot_common::Lock;

use super::working_dir::WorkingDir;
use super::working_dir_locker::WorkingDirLocker;
use crate::errors::DeleteLockError;
use crate::locking::Locker;
use crate::vcs::VcsClient;

/// Discards a lock on operator request: releases it, removes the plan it
/// protected and tells the pull request the plan is gone.
#[derive(Clone)]
pub struct DeleteLockCommand {
    pub locker: Arc<dyn Locker>,
    pub working_dir: Arc<dyn WorkingDir>,
    pub working_dir_locker: WorkingDirLocker,
    pub vcs_client: Arc<dyn VcsClient>,
}

impl DeleteLockCommand {
    /// Returns the removed lock, or `None` if no lock exists at `id`.
    ///
    /// Only a store failure or a failed comment is an error; the unlock is
    /// authoritative once it succeeds, so workspace cleanup problems are
    /// logged and otherwise ignored.
    pub async fn delete_lock(&self, id: &str) -> Result<Option<Lock>, DeleteLockError> {
        let Some(lock) = self.locker.unlock(id).await.map_err(DeleteLockError::Store)? else {
            return Ok(None);
        };

        // Locks written before the base repo was recorded carry no pull
        // location; there is nothing to clean up or comment on.
        let Some(base_repo) = lock.pull.base_repo.as_ref() else {
            tracing::debug!(
                lock = %id,
                "skipping commenting on pull request and deleting workspace because base repo is missing"
            );
            return Ok(Some(lock));
        };

        match self
            .working_dir_locker
            .try_lock(&base_repo.full_name, &lock.workspace, lock.pull.num)
        {
            Err(err) => {
                tracing::error!(lock = %id, error = %err, "unable to obtain working dir lock when trying to delete old plans");
            }
            Ok(_guard) => {
                if let Err(err) = self
                    .working_dir
                    .delete_for_workspace(base_repo, &lock.pull, &lock.workspace)
                    .await
                {
                    tracing::error!(lock = %id, error = format!("{:#}", err), "unable to delete workspace");
                }
            }
        }

        let comment = format!(
            "**Warning**: The plan for dir: `{}` workspace: `{}` was **discarded** via the tfpilot UI.\n\n\
             To `apply` you must run `plan` again.",
            lock.project.path, lock.workspace
        );
        self.vcs_client
            .create_comment(base_repo, lock.pull.num, &comment)
            .await
            .map_err(DeleteLockError::Comment)?;
        Ok(Some(lock))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::working_dir::FileWorkspace;
    use crate::locking::tests::lock_for;
    use crate::locking::{Backend, LockManager, SqliteBackend};
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tfpilot_common::{CommitStatus, PullRequest, Repo};

    #[derive(Default)]
    pub struct CommentRecorder {
        pub comments: Mutex<Vec<(String, u64, String)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl VcsClient for CommentRecorder {
        async fn create_comment(&self, repo: &Repo, pull_num: u64, comment: &str) -> Result<()> {
            if self.fail {
                bail!("403 Forbidden");
            }
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

    pub struct Fixture {
        pub backend: Arc<SqliteBackend>,
        pub vcs: Arc<CommentRecorder>,
        pub working_dir: Arc<FileWorkspace>,
        pub working_dir_locker: WorkingDirLocker,
        pub command: DeleteLockCommand,
        _tmp: tempfile::TempDir,
    }

    pub fn fixture(vcs: CommentRecorder) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(SqliteBackend::new_in_memory().unwrap());
        let vcs = Arc::new(vcs);
        let working_dir = Arc::new(FileWorkspace::new(tmp.path()));
        let working_dir_locker = WorkingDirLocker::new();
        let command = DeleteLockCommand {
            locker: Arc::new(LockManager::new(backend.clone())),
            working_dir: working_dir.clone(),
            working_dir_locker: working_dir_locker.clone(),
            vcs_client: vcs.clone(),
        };
        Fixture {
            backend,
            vcs,
            working_dir,
            working_dir_locker,
            command,
            _tmp: tmp,
        }
    }

    fn seed(f: &Fixture, lock: &Lock) -> std::path::PathBuf {
        f.backend.try_lock(lock).unwrap();
        let repo = lock.pull.base_repo.clone().unwrap();
        let dir = f.working_dir.get_working_dir(&repo, &lock.pull, &lock.workspace);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("default.tfplan"), "plan").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_delete_unlocks_cleans_up_and_comments() {
        let f = fixture(CommentRecorder::default());
        let lock = lock_for("org/repo", "modules/vpc", "staging", 5);
        let dir = seed(&f, &lock);

        let removed = f.command.delete_lock(&lock.key()).await.unwrap();

        assert_eq!(removed, Some(lock.clone()));
        assert!(f.backend.get_lock(&lock.key()).unwrap().is_none());
        assert!(!dir.exists());
        assert!(!f.working_dir_locker.is_locked("org/repo", "staging", 5));
        let comments = f.vcs.comments.lock().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, "org/repo");
        assert_eq!(comments[0].1, 5);
        assert_eq!(
            comments[0].2,
            "**Warning**: The plan for dir: `modules/vpc` workspace: `staging` was **discarded** via the tfpilot UI.\n\nTo `apply` you must run `plan` again."
        );
    }

    #[tokio::test]
    async fn test_unknown_id_is_none_without_side_effects() {
        let f = fixture(CommentRecorder::default());
        let other = lock_for("org/repo", ".", "default", 5);
        f.backend.try_lock(&other).unwrap();

        let removed = f.command.delete_lock("org/repo/missing/default").await.unwrap();

        assert!(removed.is_none());
        assert!(f.backend.get_lock(&other.key()).unwrap().is_some());
        assert!(f.vcs.comments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_without_base_repo_skips_cleanup_and_comment() {
        let f = fixture(CommentRecorder::default());
        let mut lock = lock_for("org/repo", ".", "default", 5);
        let dir = seed(&f, &lock);
        f.backend.unlock(&lock.key()).unwrap();
        lock.pull.base_repo = None;
        f.backend.try_lock(&lock).unwrap();

        let removed = f.command.delete_lock(&lock.key()).await.unwrap();

        assert!(removed.is_some());
        assert!(dir.exists());
        assert!(f.vcs.comments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_busy_working_dir_still_deletes_and_comments() {
        let f = fixture(CommentRecorder::default());
        let lock = lock_for("org/repo", ".", "default", 5);
        let dir = seed(&f, &lock);
        let _busy = f.working_dir_locker.try_lock("org/repo", "default", 5).unwrap();

        let removed = f.command.delete_lock(&lock.key()).await.unwrap();

        assert!(removed.is_some());
        assert!(dir.exists());
        assert_eq!(f.vcs.comments.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_comment_failure_surfaces_after_unlock() {
        let f = fixture(CommentRecorder {
            fail: true,
            ..Default::default()
        });
        let lock = lock_for("org/repo", ".", "default", 5);
        seed(&f, &lock);

        let err = f.command.delete_lock(&lock.key()).await.unwrap_err();

        assert!(matches!(err, DeleteLockError::Comment(_)));
        assert!(err.to_string().contains("403 Forbidden"));
        assert!(f.backend.get_lock(&lock.key()).unwrap().is_none());
    }
}
