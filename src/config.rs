//! Server configuration.
//!
//! Values are layered, later layers winning:
//! 1. built-in defaults
//! 2. `tfpilot.toml`
//! 3. `TFPILOT_*` environment variables
//! 4. CLI flags

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "tfpilot.toml";

/// Flag users are told to set when a fork pull request is refused.
pub const ALLOW_FORK_PRS_FLAG: &str = "allow-fork-prs";

pub const DEFAULT_PORT: u16 = 4141;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubSection {
    #[serde(default = "default_github_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub token: String,
}

fn default_github_hostname() -> String {
    "github.com".to_string()
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            hostname: default_github_hostname(),
            user: String::new(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitlabSection {
    #[serde(default = "default_gitlab_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub token: String,
}

fn default_gitlab_hostname() -> String {
    "gitlab.com".to_string()
}

impl Default for GitlabSection {
    fn default() -> Self {
        Self {
            hostname: default_gitlab_hostname(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Root for checkouts and the lock database.
    pub data_dir: PathBuf,
    /// Lock database; `<data_dir>/tfpilot.db` when unset.
    pub db_path: Option<PathBuf>,
    pub allow_fork_prs: bool,
    pub log_level: String,
    pub log_json: bool,
    pub github: Option<GithubSection>,
    pub gitlab: Option<GitlabSection>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: default_data_dir(),
            db_path: None,
            allow_fork_prs: false,
            log_level: "info".to_string(),
            log_json: false,
            github: None,
            gitlab: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".tfpilot"))
        .unwrap_or_else(|| PathBuf::from(".tfpilot"))
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub allow_fork_prs: bool,
    pub log_level: Option<String>,
}

impl ServerConfig {
    /// Parse configuration from a TOML string on top of the defaults.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Full layered load. An explicit `config_path` must exist; otherwise
    /// `tfpilot.toml` in the working directory is used when present.
    pub fn load(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::load_file(path)?,
            None if Path::new(CONFIG_FILE_NAME).exists() => {
                Self::load_file(Path::new(CONFIG_FILE_NAME))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.apply_cli(cli);
        Ok(config)
    }

    /// Apply `TFPILOT_*` variables read through `var`.
    pub fn apply_env(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = var("TFPILOT_PORT") {
            self.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "TFPILOT_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(dir) = var("TFPILOT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = var("TFPILOT_DB_PATH") {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(value) = var("TFPILOT_ALLOW_FORK_PRS") {
            self.allow_fork_prs = parse_bool("TFPILOT_ALLOW_FORK_PRS", &value)?;
        }
        if let Some(level) = var("TFPILOT_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(value) = var("TFPILOT_LOG_JSON") {
            self.log_json = parse_bool("TFPILOT_LOG_JSON", &value)?;
        }

        let gh_hostname = var("TFPILOT_GH_HOSTNAME");
        let gh_user = var("TFPILOT_GH_USER");
        let gh_token = var("TFPILOT_GH_TOKEN");
        if gh_hostname.is_some() || gh_user.is_some() || gh_token.is_some() {
            let github = self.github.get_or_insert_with(GithubSection::default);
            if let Some(hostname) = gh_hostname {
                github.hostname = hostname;
            }
            if let Some(user) = gh_user {
                github.user = user;
            }
            if let Some(token) = gh_token {
                github.token = token;
            }
        }

        let gl_hostname = var("TFPILOT_GITLAB_HOSTNAME");
        let gl_token = var("TFPILOT_GITLAB_TOKEN");
        if gl_hostname.is_some() || gl_token.is_some() {
            let gitlab = self.gitlab.get_or_insert_with(GitlabSection::default);
            if let Some(hostname) = gl_hostname {
                gitlab.hostname = hostname;
            }
            if let Some(token) = gl_token {
                gitlab.token = token;
            }
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(dir) = &cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(path) = &cli.db_path {
            self.db_path = Some(path.clone());
        }
        if cli.allow_fork_prs {
            self.allow_fork_prs = true;
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
    }

    /// Resolved lock database path.
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("tfpilot.db"))
    }

    /// Human-readable problems with this configuration; empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.port == 0 {
            problems.push("port must be between 1 and 65535".to_string());
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            problems.push(format!(
                "Invalid log_level '{}': expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }
        if self.github.is_none() && self.gitlab.is_none() {
            problems.push("no VCS host configured: add a [github] or [gitlab] section".to_string());
        }
        if let Some(github) = &self.github {
            if github.hostname.is_empty() {
                problems.push("[github] hostname cannot be empty".to_string());
            }
            if github.user.is_empty() {
                problems.push("[github] user is required".to_string());
            }
            if github.token.is_empty() {
                problems.push("[github] token is required (or set TFPILOT_GH_TOKEN)".to_string());
            }
        }
        if let Some(gitlab) = &self.gitlab {
            if gitlab.hostname.is_empty() {
                problems.push("[gitlab] hostname cannot be empty".to_string());
            }
            if gitlab.token.is_empty() {
                problems.push(
                    "[gitlab] token is required (or set TFPILOT_GITLAB_TOKEN)".to_string(),
                );
            }
        }
        problems
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        }),
    }
}
