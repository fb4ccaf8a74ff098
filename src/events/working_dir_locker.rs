use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::WorkingDirLockError;

/// Guards filesystem mutation of pull request checkouts.
///
/// A claim covers either one `(repository, workspace, pull)` checkout or,
/// through [`WorkingDirLocker::try_lock_pull`], every checkout of a pull.
/// The two kinds contend with each other. Acquisition is non-blocking: a
/// second caller for a held checkout gets an error instead of waiting. The
/// returned [`WorkingDirLock`] releases its claim when dropped, so every exit
/// path (including `?` and panics) releases it.
#[derive(Debug, Clone, Default)]
pub struct WorkingDirLocker {
    held: Arc<Mutex<HashSet<Claim>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Claim {
    repo_full_name: String,
    pull_num: u64,
    /// `None` claims the whole pull.
    workspace: Option<String>,
}

impl Claim {
    fn conflicts_with(&self, other: &Claim) -> bool {
        self.repo_full_name == other.repo_full_name
            && self.pull_num == other.pull_num
            && match (&self.workspace, &other.workspace) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.workspace {
            Some(workspace) => write!(f, "{}/{}/{}", self.repo_full_name, workspace, self.pull_num),
            None => write!(f, "{}/{}", self.repo_full_name, self.pull_num),
        }
    }
}

impl WorkingDirLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim one workspace checkout. Fails while the same checkout or the
    /// whole pull is held.
    pub fn try_lock(
        &self,
        repo_full_name: &str,
        workspace: &str,
        pull_num: u64,
    ) -> Result<WorkingDirLock, WorkingDirLockError> {
        self.claim(Claim {
            repo_full_name: repo_full_name.to_string(),
            pull_num,
            workspace: Some(workspace.to_string()),
        })
        .ok_or_else(|| WorkingDirLockError::AlreadyLocked {
            workspace: workspace.to_string(),
        })
    }

    /// Claim every checkout of a pull. Fails while any of its workspaces is
    /// held.
    pub fn try_lock_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<WorkingDirLock, WorkingDirLockError> {
        self.claim(Claim {
            repo_full_name: repo_full_name.to_string(),
            pull_num,
            workspace: None,
        })
        .ok_or(WorkingDirLockError::PullLocked { pull_num })
    }

    fn claim(&self, claim: Claim) -> Option<WorkingDirLock> {
        let mut held = lock_set(&self.held);
        if held.iter().any(|existing| existing.conflicts_with(&claim)) {
            return None;
        }
        held.insert(claim.clone());
        tracing::debug!(key = %claim, "working dir locked");
        Some(WorkingDirLock {
            claim,
            held: Arc::clone(&self.held),
        })
    }

    /// Whether this exact checkout is currently held.
    pub fn is_locked(&self, repo_full_name: &str, workspace: &str, pull_num: u64) -> bool {
        lock_set(&self.held).contains(&Claim {
            repo_full_name: repo_full_name.to_string(),
            pull_num,
            workspace: Some(workspace.to_string()),
        })
    }
}

/// Scoped hold on a checkout or a whole pull; released on drop.
#[derive(Debug)]
#[must_use = "the working dir is released as soon as this guard is dropped"]
pub struct WorkingDirLock {
    claim: Claim,
    held: Arc<Mutex<HashSet<Claim>>>,
}

impl WorkingDirLock {
    /// `repo/workspace/pull` for a checkout, `repo/pull` for a whole pull.
    pub fn key(&self) -> String {
        self.claim.to_string()
    }
}

impl Drop for WorkingDirLock {
    fn drop(&mut self) {
        lock_set(&self.held).remove(&self.claim);
        tracing::debug!(key = %self.claim, "working dir released");
    }
}

// The set holds plain claims; a panic while it was held cannot leave it
// inconsistent, so recover from poisoning instead of wedging every checkout.
fn lock_set(set: &Mutex<HashSet<Claim>>) -> MutexGuard<'_, HashSet<Claim>> {
    match set.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
