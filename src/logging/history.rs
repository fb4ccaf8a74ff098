use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::Level;

/// Accumulates every line logged during one command invocation so the final
/// pull request comment can include a transcript of the run.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    inner: Arc<Mutex<String>>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: Level, source: &str, message: &str) {
        // A poisoned buffer only means another holder panicked mid-write;
        // the text itself is still usable.
        let mut history = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(
            history,
            "{} {:<5} {}: {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            level.to_string(),
            source,
            message
        );
    }

    /// Snapshot of everything recorded so far.
    pub fn contents(&self) -> String {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contents().is_empty()
    }
}

/// Logger scoped to one `owner/repo#N` invocation.
///
/// Every call is emitted as a `tracing` event carrying a `pull` field and is
/// also appended to the invocation's [`HistoryBuffer`]. Clones share the
/// buffer, so per-project units of the same run write into one transcript.
#[derive(Debug, Clone)]
pub struct CommandLogger {
    source: String,
    history: HistoryBuffer,
}

impl CommandLogger {
    /// Fresh logger with an empty history for `repo_full_name#pull_num`.
    pub fn for_pull(repo_full_name: &str, pull_num: u64) -> Self {
        Self {
            source: format!("{}#{}", repo_full_name, pull_num),
            history: HistoryBuffer::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(pull = %self.source, "{}", message);
        self.history.push(Level::DEBUG, &self.source, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(pull = %self.source, "{}", message);
        self.history.push(Level::INFO, &self.source, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!(pull = %self.source, "{}", message);
        self.history.push(Level::WARN, &self.source, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!(pull = %self.source, "{}", message);
        self.history.push(Level::ERROR, &self.source, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_scoped_to_repo_and_pull() {
        let logger = CommandLogger::for_pull("org/repo", 5);
        assert_eq!(logger.source(), "org/repo#5");
        assert!(logger.history().is_empty());
    }

    #[test]
    fn test_every_level_lands_in_history() {
        let logger = CommandLogger::for_pull("org/repo", 5);
        logger.debug("cloning");
        logger.info("planning");
        logger.warn("status update failed");
        logger.error("boom");

        let history = logger.history().contents();
        let lines: Vec<&str> = history.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("DEBUG org/repo#5: cloning"));
        assert!(lines[1].contains("INFO  org/repo#5: planning"));
        assert!(lines[2].contains("WARN  org/repo#5: status update failed"));
        assert!(lines[3].contains("ERROR org/repo#5: boom"));
    }

    #[test]
    fn test_clones_share_one_history() {
        let logger = CommandLogger::for_pull("org/repo", 1);
        let project_logger = logger.clone();
        project_logger.info("from project");
        assert!(logger.history().contents().contains("from project"));
    }

    #[test]
    fn test_new_invocations_start_empty() {
        let first = CommandLogger::for_pull("org/repo", 1);
        first.info("first run");
        let second = CommandLogger::for_pull("org/repo", 1);
        assert!(second.history().is_empty());
    }
}
