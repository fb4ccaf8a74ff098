//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `server`  | `Server`         |
//! | `locks`   | `Locks`          |
//! | `config`  | `Config`         |

pub mod config;
pub mod locks;
pub mod server;

use anyhow::Result;

pub use config::cmd_config;
pub use locks::cmd_locks;
pub use server::cmd_server;

use super::Cli;

/// Logging for the short-lived inspection commands: quiet unless `-v`.
pub fn init_cli_tracing(cli: &Cli) -> Result<()> {
    let level = if cli.verbose { "debug" } else { "warn" };
    tfpilot::logging::init_tracing(level, false)
}
