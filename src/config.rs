use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Regex searched for in each comment body.
    #[serde(default = "default_match_pattern")]
    pub match_pattern: String,

    /// Authors never captured, compared case-insensitively.
    #[serde(default = "default_excluded_authors")]
    pub excluded_authors: Vec<String>,

    /// Communities never captured, compared case-insensitively.
    #[serde(default)]
    pub excluded_origins: Vec<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Upper bound on any single rate-limit backoff.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Pause after an update cycle that found nothing to re-check. Zero starts
    /// the next cycle right away.
    #[serde(default)]
    pub update_idle_secs: u64,

    #[serde(default)]
    pub restart_delay_ms: u64,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("comment-tracker");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("comments.db").to_string_lossy().to_string()
}

fn default_match_pattern() -> String {
    // did [1-3 words] just assume [word]
    r"(?i)did (.+){1,3} just assume .*".to_string()
}

fn default_excluded_authors() -> Vec<String> {
    ["srscreenshot", "ttumblrbots", "totesmessenger", "snapshillbot"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_batch_size() -> usize {
    200
}

fn default_worker_count() -> usize {
    3
}

fn default_max_backoff_secs() -> u64 {
    900
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_base_url() -> String {
    "https://www.reddit.com".to_string()
}

fn default_user_agent() -> String {
    "comment-tracker/0.1 (score collector)".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            match_pattern: default_match_pattern(),
            excluded_authors: default_excluded_authors(),
            excluded_origins: Vec::new(),
            batch_size: default_batch_size(),
            worker_count: default_worker_count(),
            max_backoff_secs: default_max_backoff_secs(),
            update_idle_secs: 0,
            restart_delay_ms: 0,
            shutdown_grace_secs: default_shutdown_grace_secs(),
            source: SourceConfig::default(),
        }
    }
}

impl Config {
    /// Loads the config at `path` (or the default location), writing the
    /// defaults there first if the file does not exist yet.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("comment-tracker")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(AppError::Config("worker_count must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(AppError::Config("batch_size must be at least 1".to_string()));
        }
        regex::Regex::new(&self.match_pattern)?;
        url::Url::parse(&self.source.base_url)?;
        Ok(())
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn update_idle(&self) -> Duration {
        Duration::from_secs(self.update_idle_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
