//! Lock inspection commands (`tfpilot locks`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tfpilot::config::{CliOverrides, ServerConfig};
use tfpilot::locking::{LockManager, Locker, SqliteBackend};

use super::super::{Cli, LocksCommands};

pub async fn cmd_locks(cli: &Cli, db_path: Option<PathBuf>, command: LocksCommands) -> Result<()> {
    let overrides = CliOverrides {
        db_path,
        ..Default::default()
    };
    let config = ServerConfig::load(cli.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;
    let db_path = config.db_path();

    if !db_path.exists() {
        match command {
            LocksCommands::List => {
                println!("No locks held.");
                return Ok(());
            }
            LocksCommands::Show { id } => bail!("No lock found at id {:?}", id),
        }
    }

    let backend = SqliteBackend::new(&db_path)
        .with_context(|| format!("Failed to open lock database {}", db_path.display()))?;
    let locker = LockManager::new(Arc::new(backend));

    match command {
        LocksCommands::List => {
            let locks = locker.list().await?;
            if locks.is_empty() {
                println!("No locks held.");
                return Ok(());
            }
            println!("{:<50} {:>6}  {:<16} ACQUIRED", "ID", "PULL", "USER");
            for lock in locks {
                println!(
                    "{:<50} {:>6}  {:<16} {}",
                    lock.key(),
                    lock.pull.num,
                    lock.user.username,
                    lock.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        LocksCommands::Show { id } => {
            let Some(lock) = locker.get_lock(&id).await? else {
                bail!("No lock found at id {:?}", id);
            };
            println!("Lock:        {}", lock.key());
            println!("Repository:  {}", lock.project.repo_full_name);
            println!("Path:        {}", lock.project.path);
            println!("Workspace:   {}", lock.workspace);
            println!("Pull:        #{} {}", lock.pull.num, lock.pull.url);
            println!("Locked by:   {}", lock.user.username);
            println!(
                "Acquired at: {}",
                lock.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }

    Ok(())
}
