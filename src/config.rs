// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones

use crate::paths;
use anyhow::{Context, Result};
use ordo_core::config::ClientConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Prefixes, elevated users and ignored authors for the command handler
    #[serde(default)]
    pub bot: ClientConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleBackend {
    #[default]
    Memory,
    Sqlite,
}

impl std::str::FromStr for ThrottleBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => anyhow::bail!("Unknown throttle backend '{}' (expected memory or sqlite)", other),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default)]
    pub backend: ThrottleBackend,
    /// SQLite database file; defaults to the XDG data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ThrottleConfig {
    pub fn db_path(&self) -> PathBuf {
        self.path
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(paths::throttle_db)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Also write daily-rotated logs into the data directory
    #[serde(default)]
    pub file: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address for the Prometheus scrape endpoint; disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

impl MetricsConfig {
    pub fn socket_addr(&self) -> Result<Option<SocketAddr>> {
        self.addr
            .as_deref()
            .map(|addr| {
                addr.parse::<SocketAddr>()
                    .with_context(|| format!("metrics.addr must be host:port, got: {}", addr))
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// User id console input is attributed to
    #[serde(default = "default_console_user")]
    pub user_id: String,
    #[serde(default = "default_console_channel")]
    pub channel_id: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            user_id: default_console_user(),
            channel_id: default_console_channel(),
        }
    }
}

fn default_console_user() -> String {
    "console".to_string()
}

fn default_console_channel() -> String {
    "console".to_string()
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
        tracing::warn!("Failed to expand tilde: could not determine home directory");
    }
    PathBuf::from(path)
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. ORDO_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/ordo/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("ORDO_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration with environment variable overrides.
    /// Searches: ORDO_CONFIG_PATH env var, ./config.toml, then ~/.config/ordo/config.toml
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], but an explicit path must exist and wins over the search
    pub fn load_from(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => Self::find_config_file(),
        };

        let mut config = if let Some(config_path) = path {
            tracing::info!(path = %config_path.display(), "Loading configuration from file");
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("ORDO_PREFIX") {
            self.bot.prefix = split_list(&val);
        }
        if let Ok(val) = std::env::var("ORDO_ELEVATED") {
            self.bot.elevated = split_list(&val);
        }
        if let Ok(val) = std::env::var("ORDO_THROTTLE_BACKEND") {
            self.throttle.backend = val
                .parse()
                .context("ORDO_THROTTLE_BACKEND is invalid")?;
        }
        if let Ok(val) = std::env::var("ORDO_THROTTLE_PATH") {
            self.throttle.path = Some(val);
        }
        if let Ok(val) = std::env::var("ORDO_LOG_FORMAT") {
            self.logging.format = match val.trim().to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => anyhow::bail!("ORDO_LOG_FORMAT must be pretty or json, got: {}", other),
            };
        }
        if let Ok(val) = std::env::var("ORDO_METRICS_ADDR") {
            self.metrics.addr = Some(val).filter(|v| !v.trim().is_empty());
        }
        if let Ok(val) = std::env::var("ORDO_CONSOLE_USER") {
            self.console.user_id = val;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.bot.prefix.retain(|p| !p.is_empty());
        if self.bot.prefix.is_empty() && !self.bot.mention_prefix {
            anyhow::bail!(
                "bot.prefix is required unless bot.mention_prefix is enabled (set in config.toml or ORDO_PREFIX env var)"
            );
        }
        if self.console.user_id.trim().is_empty() {
            anyhow::bail!("console.user_id must not be empty");
        }
        self.metrics.socket_addr()?;
        Ok(())
    }
}
