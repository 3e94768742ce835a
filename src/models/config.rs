//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Document store namespace settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Monitoring / refresh behavior settings
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::config("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::config("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::config("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.max_attempts == Some(0) {
            return Err(AppError::config(
                "crawler.max_attempts must be > 0 when set",
            ));
        }
        if self.monitor.update_days == 0 {
            return Err(AppError::config("monitor.update_days must be > 0"));
        }
        if self.storage.post_db.trim().is_empty() || self.storage.comment_db.trim().is_empty() {
            return Err(AppError::config("storage database names must not be empty"));
        }
        if self.storage.staging_suffix.trim().is_empty() {
            return Err(AppError::config("storage.staging_suffix must not be empty"));
        }
        Ok(())
    }
}

/// HTTP client and fetch behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Number of fetch workers
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Pool-wide pause after a rate-limit signal, in seconds
    #[serde(default = "defaults::rate_limit_wait")]
    pub rate_limit_wait_secs: u64,

    /// Worker-local pause after a transport failure, in seconds
    #[serde(default = "defaults::transport_wait")]
    pub transport_wait_secs: u64,

    /// Backoff between retries of a failed listing page, in seconds
    #[serde(default = "defaults::page_retry_wait")]
    pub page_retry_wait_secs: u64,

    /// Attempt cap per task/page; unset means retry indefinitely,
    /// which matches upstream behavior but is risky against a
    /// permanently failing dependency
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Post lookup strategy (fast id path vs shortcode web path)
    #[serde(default)]
    pub post_lookup: PostLookup,

    /// Comment fetch strategy
    #[serde(default)]
    pub comment_detail: CommentDetail,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            rate_limit_wait_secs: defaults::rate_limit_wait(),
            transport_wait_secs: defaults::transport_wait(),
            page_retry_wait_secs: defaults::page_retry_wait(),
            max_attempts: None,
            post_lookup: PostLookup::default(),
            comment_detail: CommentDetail::default(),
        }
    }
}

impl CrawlerConfig {
    /// Retry policy for pagination page retries.
    pub fn page_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            wait: Duration::from_secs(self.page_retry_wait_secs),
            max_attempts: self.max_attempts,
        }
    }
}

/// Which endpoint the pool uses to fetch a post body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostLookup {
    /// Fetch by internal media id (richer payload, needs a session)
    Id,
    /// Fetch by public shortcode (web payload)
    #[default]
    Shortcode,
}

/// How much comment detail to fetch for a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommentDetail {
    /// Top-level comments only
    #[default]
    Standard,
    /// Include threaded replies (slower)
    Extended,
}

/// Document store namespace settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Canonical database holding one post collection per query
    #[serde(default = "defaults::post_db")]
    pub post_db: String,

    /// Canonical database holding one comment collection per post
    #[serde(default = "defaults::comment_db")]
    pub comment_db: String,

    /// Suffix appended to a canonical database name to form its
    /// per-run staging database
    #[serde(default = "defaults::staging_suffix")]
    pub staging_suffix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            post_db: defaults::post_db(),
            comment_db: defaults::comment_db(),
            staging_suffix: defaults::staging_suffix(),
        }
    }
}

/// Monitoring and refresh behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Days old a post must be before it stops being re-fetched and is
    /// marked archived at write time
    #[serde(default = "defaults::update_days")]
    pub update_days: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            update_days: defaults::update_days(),
        }
    }
}

/// Retry schedule for an operation against a failing dependency.
///
/// `max_attempts = None` retries indefinitely, matching the source
/// behavior of never abandoning a listing page or a queued task.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Fixed wait between attempts
    pub wait: Duration,
    /// Total attempt cap; None means unbounded
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` completed tries.
    pub fn allows(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(cap) => attempt < cap,
            None => true,
        }
    }
}

mod defaults {
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; feedwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        5
    }
    pub fn rate_limit_wait() -> u64 {
        30
    }
    pub fn transport_wait() -> u64 {
        5
    }
    pub fn page_retry_wait() -> u64 {
        30
    }
    pub fn post_db() -> String {
        "post".into()
    }
    pub fn comment_db() -> String {
        "comment".into()
    }
    pub fn staging_suffix() -> String {
        "-staging".into()
    }
    pub fn update_days() -> u64 {
        2
    }
}
