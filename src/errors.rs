//! Typed error hierarchy for tfpilot.
//!
//! - `CommandError`: terminal failures of a command invocation
//! - `ValidationError`: requests rejected before any status work
//! - `LockError`: lock store failures
//! - `WorkingDirLockError`: contention on a checkout
//! - `DeleteLockError`: manual lock deletion failures
//! - `LockIdError`: undecodable lock ids on the HTTP surface

use thiserror::Error;

/// Terminal failures of a single command invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The repo's host type has no configured integration.
    #[error("tfpilot is not configured to support {host}")]
    Configuration { host: &'static str },

    #[error("failed resolving pull request: {0:#}")]
    PullResolution(#[source] anyhow::Error),

    #[error("{0:#}")]
    Builder(#[source] anyhow::Error),
}

/// Reasons a command is refused before it starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("command was run on a fork pull request which is disallowed")]
    ForkPullRequest,

    #[error("command was run on closed pull request")]
    ClosedPullRequest,
}

/// Failures from the lock backing store.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("failed to (de)serialize lock: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid timestamp on lock {id}: {source}")]
    Timestamp {
        id: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("lock store connection poisoned")]
    Poisoned,

    #[error("pull request number {0} is too large for the lock store")]
    PullNumberOutOfRange(u64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkingDirLockError {
    #[error(
        "the {workspace} workspace is currently locked by another command that is running for this pull request: wait until the previous command is complete and try again"
    )]
    AlreadyLocked { workspace: String },

    #[error(
        "a command is currently running for pull request #{pull_num}: wait until it is complete and try again"
    )]
    PullLocked { pull_num: u64 },
}

#[derive(Debug, Error)]
pub enum DeleteLockError {
    #[error("deleting lock failed with: {0:#}")]
    Store(#[source] anyhow::Error),

    #[error("failed commenting on pull request: {0:#}")]
    Comment(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockIdError {
    #[error("no lock id in request")]
    Missing,

    #[error("invalid escape {0:?} in lock id")]
    InvalidEscape(String),

    #[error("lock id is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_names_the_host() {
        let err = CommandError::Configuration { host: "GitLab" };
        assert_eq!(err.to_string(), "tfpilot is not configured to support GitLab");
    }

    #[test]
    fn test_builder_error_displays_full_context_chain() {
        let inner = anyhow::anyhow!("no such dir").context("parsing tfpilot.yaml");
        let err = CommandError::Builder(inner);
        assert_eq!(err.to_string(), "parsing tfpilot.yaml: no such dir");
    }

    #[test]
    fn test_working_dir_lock_error_mentions_workspace() {
        let err = WorkingDirLockError::AlreadyLocked {
            workspace: "staging".into(),
        };
        assert!(err.to_string().contains("staging workspace"));
    }

    #[test]
    fn test_lock_error_converts_from_rusqlite() {
        let err: LockError = rusqlite::Error::QueryReturnedNoRows.into();
        match &err {
            LockError::Store(rusqlite::Error::QueryReturnedNoRows) => {}
            other => panic!("Expected Store, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_lock_errors_are_distinguishable() {
        let store = DeleteLockError::Store(anyhow::anyhow!("disk full"));
        let comment = DeleteLockError::Comment(anyhow::anyhow!("403"));
        assert!(store.to_string().starts_with("deleting lock failed"));
        assert!(comment.to_string().starts_with("failed commenting"));
    }
}
