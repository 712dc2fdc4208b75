//! Configuration for the conductor.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CONDUCTOR_HOME, CONDUCTOR_DATABASE, CONDUCTOR_WEBHOOK_URL)
//! 2. Config file (.conductor/config.yaml)
//! 3. Defaults (~/.conductor, <home>/conductor.db)
//!
//! Config file discovery:
//! - Searches current directory and parents for .conductor/config.yaml
//! - Paths in config file are relative to the .conductor/ directory
//!
//! Library code never reads this module; the CLI resolves the config once
//! and passes the pieces into constructors.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::RetryPolicy;
use crate::core::PipelineSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".conductor";
const DEFAULT_DATABASE: &str = "conductor.db";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .conductor/)
    pub home: Option<String>,
    /// SQLite database file (relative to .conductor/)
    pub database: Option<String>,
}

/// Where the external collaborators live
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub practice_directory_url: Option<String>,
    pub research_url: Option<String>,
    pub drafting_url: Option<String>,

    /// Environment variable holding the bearer token
    #[serde(default = "default_provider_token_env")]
    pub token_env: String,

    /// Per-request timeout in seconds (default: 60)
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_provider_token_env() -> String {
    "CONDUCTOR_PROVIDER_TOKEN".to_string()
}
fn default_provider_timeout() -> u64 {
    60
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            practice_directory_url: None,
            research_url: None,
            drafting_url: None,
            token_env: default_provider_token_env(),
            timeout_seconds: default_provider_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProvidersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Bearer token from the configured environment variable, if set
    pub fn token(&self) -> Option<String> {
        non_empty_env(&self.token_env)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    pub webhook_url: Option<String>,

    /// Environment variable holding the webhook bearer token
    #[serde(default = "default_webhook_token_env")]
    pub token_env: String,
}

fn default_webhook_token_env() -> String {
    "CONDUCTOR_WEBHOOK_TOKEN".to_string()
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            token_env: default_webhook_token_env(),
        }
    }
}

impl NotificationsConfig {
    pub fn token(&self) -> Option<String> {
        non_empty_env(&self.token_env)
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// Run store database
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub pipeline: PipelineSettings,
    pub providers: ProvidersConfig,
    pub notifications: NotificationsConfig,
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge the config file (if any), environment and defaults
fn resolve(
    file: Option<(PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let (config_file, config) = match file {
        Some((path, config)) => (Some(path), Some(config)),
        None => (None, None),
    };
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);
    let paths = config.as_ref().map(|c| c.paths.clone()).unwrap_or_default();

    let home = if let Some(env_home) = env("CONDUCTOR_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(dir), Some(home_path)) = (&config_dir, &paths.home) {
        resolve_path(dir, home_path)
    } else {
        default_home
    };

    let database = if let Some(env_db) = env("CONDUCTOR_DATABASE") {
        PathBuf::from(env_db)
    } else if let (Some(dir), Some(db_path)) = (&config_dir, &paths.database) {
        resolve_path(dir, db_path)
    } else {
        home.join(DEFAULT_DATABASE)
    };

    let (pipeline, providers, mut notifications) = match config {
        Some(c) => (c.pipeline, c.providers, c.notifications),
        None => Default::default(),
    };
    if let Some(url) = env("CONDUCTOR_WEBHOOK_URL") {
        notifications.webhook_url = Some(url);
    }

    pipeline
        .validate()
        .context("Invalid pipeline settings in config")?;

    Ok(ResolvedConfig {
        home,
        database,
        config_file,
        pipeline,
        providers,
        notifications,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    resolve(file, non_empty_env, default_home)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
