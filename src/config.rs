//! Crawler configuration.
//!
//! A configuration file is optional. Every field has a default so a partial
//! YAML file (or none at all) yields a usable configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file names to search for in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["flowscan.yaml", ".flowscan.yaml"];

/// Top-level crawler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Branch used for listings and raw URLs
    pub branch: String,
    /// Base URL of the contents API
    pub api_base: String,
    /// Directory to start scanning from ("" is the repository root)
    pub root: String,
    /// File name suffix of the artifacts to collect
    pub extension: String,
    /// Maximum number of fetches in flight
    pub concurrency: usize,
    pub list_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Freshness window of cached artifacts
    pub cache_ttl_secs: u64,
    /// Maximum directory nesting followed during a scan
    pub max_depth: usize,
    pub page_size: usize,
    pub retry: RetryConfig,
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            owner: "entremotivator".to_string(),
            repo: "Toolkitflow".to_string(),
            branch: "main".to_string(),
            api_base: "https://api.github.com".to_string(),
            root: String::new(),
            extension: ".json".to_string(),
            concurrency: 6,
            list_timeout_secs: 10,
            fetch_timeout_secs: 15,
            cache_ttl_secs: 600,
            max_depth: 64,
            page_size: 15,
            retry: RetryConfig::default(),
            user_agent: format!("flowscan/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Retry settings for artifact fetches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per artifact, including the first one
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 250,
        }
    }
}

impl CrawlerConfig {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse_str(&content)
    }

    /// Parse a configuration from YAML text. An empty document yields defaults.
    pub fn parse_str(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: CrawlerConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Find a config file in the working directory, then in the user config dir.
    pub fn discover() -> Option<PathBuf> {
        for name in DEFAULT_CONFIG_NAMES {
            let path = PathBuf::from(name);
            if path.exists() {
                return Some(path);
            }
        }
        let dirs = ProjectDirs::from("", "", "flowscan")?;
        let path = dirs.config_dir().join("config.yaml");
        path.exists().then_some(path)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Check the configuration for values the crawler cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() {
            anyhow::bail!("owner and repo must not be empty");
        }
        if self.extension.is_empty() {
            anyhow::bail!("extension must not be empty");
        }
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if self.page_size == 0 {
            anyhow::bail!("page_size must be at least 1");
        }
        if self.max_depth == 0 {
            anyhow::bail!("max_depth must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }
}
