use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "tfpilot")]
#[command(version, about = "Pull request driven plan/apply orchestration")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to tfpilot.toml. Defaults to ./tfpilot.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the lock API server
    Server {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding checkouts and the lock database
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Lock database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Allow commands on pull requests opened from forks
        #[arg(long)]
        allow_fork_prs: bool,

        /// Log level: trace, debug, info, warn, error
        #[arg(long)]
        log_level: Option<String>,

        /// Enable dev mode (CORS permissive for a locally served UI)
        #[arg(long)]
        dev: bool,
    },
    /// Inspect held locks
    Locks {
        #[command(subcommand)]
        command: LocksCommands,

        /// Lock database path
        #[arg(long, global = true)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum LocksCommands {
    /// List every held lock
    List,
    /// Show one lock by id (`<owner>/<repo>/<path>/<workspace>`)
    Show { id: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any problems
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Server {
            port,
            data_dir,
            db_path,
            allow_fork_prs,
            log_level,
            dev,
        } => {
            let overrides = tfpilot::config::CliOverrides {
                port: *port,
                data_dir: data_dir.clone(),
                db_path: db_path.clone(),
                allow_fork_prs: *allow_fork_prs,
                log_level: log_level.clone(),
            };
            cmd::cmd_server(&cli, overrides, *dev).await?;
        }
        Commands::Locks { command, db_path } => {
            cmd::init_cli_tracing(&cli)?;
            cmd::cmd_locks(&cli, db_path.clone(), command.clone()).await?;
        }
        Commands::Config { command } => {
            cmd::init_cli_tracing(&cli)?;
            cmd::cmd_config(&cli, command.clone())?;
        }
    }

    Ok(())
}
