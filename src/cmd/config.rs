//! Configuration view and validation commands (`tfpilot config`).

use anyhow::{Context, Result, bail};
use tfpilot::config::{CONFIG_FILE_NAME, CliOverrides, ServerConfig};

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config = ServerConfig::load(cli.config.as_deref(), &CliOverrides::default())
        .context("Failed to load configuration")?;
    let source = match &cli.config {
        Some(path) => path.display().to_string(),
        None if std::path::Path::new(CONFIG_FILE_NAME).exists() => CONFIG_FILE_NAME.to_string(),
        None => "defaults".to_string(),
    };

    match command {
        None | Some(ConfigCommands::Show) => {
            println!("Config source: {}", source);
            println!();
            println!("port = {}", config.port);
            println!("data_dir = \"{}\"", config.data_dir.display());
            println!("db_path = \"{}\"", config.db_path().display());
            println!("allow_fork_prs = {}", config.allow_fork_prs);
            println!("log_level = \"{}\"", config.log_level);
            println!("log_json = {}", config.log_json);
            if let Some(github) = &config.github {
                println!();
                println!("[github]");
                println!("  hostname = \"{}\"", github.hostname);
                println!("  user = \"{}\"", github.user);
                println!("  token = {}", mask(&github.token));
            }
            if let Some(gitlab) = &config.gitlab {
                println!();
                println!("[gitlab]");
                println!("  hostname = \"{}\"", gitlab.hostname);
                println!("  token = {}", mask(&gitlab.token));
            }
        }
        Some(ConfigCommands::Validate) => {
            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration is valid.");
                return Ok(());
            }
            println!("Configuration problems ({}):", source);
            for problem in &problems {
                println!("  - {}", problem);
            }
            bail!("{} configuration problem(s) found", problems.len());
        }
    }

    Ok(())
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "(unset)" } else { "(set)" }
}
