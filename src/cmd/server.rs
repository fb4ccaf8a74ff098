//! Lock API server command (`tfpilot server`).

use anyhow::{Context, Result};
use tfpilot::config::{CliOverrides, ServerConfig};
use tfpilot::server::{ServeOptions, start_server};

use super::super::Cli;

pub async fn cmd_server(cli: &Cli, overrides: CliOverrides, dev: bool) -> Result<()> {
    let mut config = ServerConfig::load(cli.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;
    if cli.verbose {
        config.log_level = "debug".to_string();
    }
    tfpilot::logging::init_tracing(&config.log_level, config.log_json)?;
    tfpilot::recovery::install_panic_hook();

    for problem in config.validate() {
        tracing::warn!(%problem, "configuration problem");
    }
    if config.allow_fork_prs {
        tracing::info!("commands on fork pull requests are allowed");
    }

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.data_dir.display()
        )
    })?;

    start_server(&config, ServeOptions { dev_mode: dev }).await
}
