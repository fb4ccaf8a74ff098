use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tfpilot_common::{Lock, Project, PullRequest, User};

use super::{Backend, TryLockResult};
use crate::errors::LockError;

/// SQLite-backed lock table.
///
/// Every mutating operation runs inside one `IMMEDIATE` transaction, which
/// takes the database write lock up front. Acquisition is an
/// `INSERT .. ON CONFLICT DO NOTHING` followed by a read of the winning row in
/// that same transaction, so racing callers (in this process or another one
/// sharing the file) observe exactly one holder.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the lock database at `path` and run migrations.
    pub fn new(path: &Path) -> Result<Self, LockError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.init()?;
        Ok(backend)
    }

    /// Create an in-memory lock database (for testing).
    pub fn new_in_memory() -> Result<Self, LockError> {
        let conn = Connection::open_in_memory()?;
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.init()?;
        Ok(backend)
    }

    fn init(&self) -> Result<(), LockError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS locks (
                lock_id TEXT PRIMARY KEY NOT NULL,
                repo_full_name TEXT NOT NULL,
                path TEXT NOT NULL,
                workspace TEXT NOT NULL,
                pull_num INTEGER NOT NULL,
                pull TEXT NOT NULL,
                username TEXT NOT NULL DEFAULT '',
                acquired_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_locks_pull ON locks(repo_full_name, pull_num);
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, LockError> {
        self.conn.lock().map_err(|_| LockError::Poisoned)
    }
}

const LOCK_COLUMNS: &str =
    "lock_id, repo_full_name, path, workspace, pull, username, acquired_at";

/// Raw row as stored; converted into a `Lock` outside the rusqlite closure so
/// JSON and timestamp errors keep their own variants.
struct LockRow {
    lock_id: String,
    repo_full_name: String,
    path: String,
    workspace: String,
    pull: String,
    username: String,
    acquired_at: String,
}

impl LockRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            lock_id: row.get(0)?,
            repo_full_name: row.get(1)?,
            path: row.get(2)?,
            workspace: row.get(3)?,
            pull: row.get(4)?,
            username: row.get(5)?,
            acquired_at: row.get(6)?,
        })
    }

    fn into_lock(self) -> Result<Lock, LockError> {
        let pull: PullRequest = serde_json::from_str(&self.pull)?;
        let acquired_at = DateTime::parse_from_rfc3339(&self.acquired_at)
            .map_err(|source| LockError::Timestamp {
                id: self.lock_id.clone(),
                source,
            })?
            .with_timezone(&Utc);
        Ok(Lock {
            project: Project::new(self.repo_full_name, self.path),
            workspace: self.workspace,
            pull,
            user: User::new(self.username),
            acquired_at,
        })
    }
}

/// SQLite integers are signed; refuse pull numbers that would wrap.
fn stored_pull_num(num: u64) -> Result<i64, LockError> {
    i64::try_from(num).map_err(|_| LockError::PullNumberOutOfRange(num))
}

fn select_lock(conn: &Connection, id: &str) -> Result<Option<Lock>, LockError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM locks WHERE lock_id = ?1", LOCK_COLUMNS),
            params![id],
            LockRow::from_row,
        )
        .optional()?;
    row.map(LockRow::into_lock).transpose()
}

impl Backend for SqliteBackend {
    fn try_lock(&self, lock: &Lock) -> Result<TryLockResult, LockError> {
        let key = lock.key();
        let pull_json = serde_json::to_string(&lock.pull)?;
        let pull_num = stored_pull_num(lock.pull.num)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO locks (lock_id, repo_full_name, path, workspace, pull_num, pull, username, acquired_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(lock_id) DO NOTHING",
            params![
                key,
                lock.project.repo_full_name,
                lock.project.path,
                lock.workspace,
                pull_num,
                pull_json,
                lock.user.username,
                lock.acquired_at.to_rfc3339(),
            ],
        )?;
        let current = select_lock(&tx, &key)?
            .ok_or_else(|| LockError::Other(anyhow::anyhow!("lock {} vanished mid-transaction", key)))?;
        tx.commit()?;

        Ok(TryLockResult {
            acquired: inserted == 1
                || current.is_held_by(&lock.project.repo_full_name, lock.pull.num),
            current,
        })
    }

    fn unlock(&self, id: &str) -> Result<Option<Lock>, LockError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = select_lock(&tx, id)?;
        if existing.is_some() {
            tx.execute("DELETE FROM locks WHERE lock_id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(existing)
    }

    fn list(&self) -> Result<Vec<Lock>, LockError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM locks ORDER BY lock_id",
            LOCK_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], LockRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(LockRow::into_lock).collect()
    }

    fn get_lock(&self, id: &str) -> Result<Option<Lock>, LockError> {
        let conn = self.conn()?;
        select_lock(&conn, id)
    }

    fn unlock_by_pull(&self, repo_full_name: &str, pull_num: u64) -> Result<Vec<Lock>, LockError> {
        let pull_num = stored_pull_num(pull_num)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let rows = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM locks WHERE repo_full_name = ?1 AND pull_num = ?2 ORDER BY lock_id",
                LOCK_COLUMNS
            ))?;
            stmt.query_map(params![repo_full_name, pull_num], LockRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        tx.execute(
            "DELETE FROM locks WHERE repo_full_name = ?1 AND pull_num = ?2",
            params![repo_full_name, pull_num],
        )?;
        tx.commit()?;
        rows.into_iter().map(LockRow::into_lock).collect()
    }
}
