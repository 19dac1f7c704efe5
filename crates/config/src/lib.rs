//! Configuration loading, validation, and management for calsync.
//!
//! Loads configuration from `~/.calsync/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.calsync/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model used by the decision loop
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Cheap single-turn classifier run before the decision loop
    #[serde(default)]
    pub prefilter: PrefilterConfig,

    /// Decision loop limits and workflow rules
    #[serde(default)]
    pub agent: AgentConfig,

    /// Target calendar
    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Session transcript settings
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    /// Per-model pricing overrides (model name → pricing)
    #[serde(default)]
    pub pricing: HashMap<String, PricingOverrideConfig>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_anthropic_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_model() -> String {
    "claude-sonnet-4-5".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_anthropic_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_prefilter_model")]
    pub model: String,

    #[serde(default = "default_prefilter_max_tokens")]
    pub max_tokens: u32,
}

fn default_true() -> bool {
    true
}
fn default_prefilter_model() -> String {
    "claude-sonnet-4-6".into()
}
fn default_prefilter_max_tokens() -> u32 {
    8
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_prefilter_model(),
            max_tokens: default_prefilter_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model turns allowed per post
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Upper bound on `create` decisions for a single post
    #[serde(default = "default_max_creates")]
    pub max_creates_per_post: usize,

    /// Refuse calendar-changing decisions until the post's images were fetched
    #[serde(default = "default_true")]
    pub require_images_before_action: bool,
}

fn default_max_turns() -> u32 {
    10
}
fn default_max_creates() -> usize {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_creates_per_post: default_max_creates(),
            require_images_before_action: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,

    /// Service-account key file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,

    /// IANA zone used for events that omit one and for "now" in prompts
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Length of timed events that have no explicit end
    #[serde(default = "default_duration_hours")]
    pub default_duration_hours: u32,

    /// How far ahead keyword searches look
    #[serde(default = "default_keyword_days")]
    pub keyword_search_days: u32,
}

fn default_timezone() -> String {
    "America/Chicago".into()
}
fn default_duration_hours() -> u32 {
    2
}
fn default_keyword_days() -> u32 {
    90
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            calendar_id: None,
            credentials_path: None,
            timezone: default_timezone(),
            default_duration_hours: default_duration_hours(),
            keyword_search_days: default_keyword_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file; defaults to `~/.calsync/calsync.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for per-post session transcripts; defaults to `~/.calsync/logs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,

    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

fn default_feed_url() -> String {
    "https://rssglue.subdavis.com/feed/cycling-merge/rss".into()
}
fn default_feed_timeout() -> u64 {
    30
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            timeout_secs: default_feed_timeout(),
        }
    }
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

impl AppConfig {
    /// Load configuration from the default path (~/.calsync/config.toml).
    ///
    /// Environment variables override file values:
    /// - `ANTHROPIC_API_KEY`
    /// - `CALSYNC_MODEL`, `CALSYNC_PREFILTER_MODEL`
    /// - `CALENDAR_ID`, `CAL_CREDS_PATH`
    /// - `CALSYNC_DB_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.anthropic.api_key = Some(key);
        }
        if let Some(model) = lookup("CALSYNC_MODEL") {
            self.anthropic.model = model;
        }
        if let Some(model) = lookup("CALSYNC_PREFILTER_MODEL") {
            self.prefilter.model = model;
        }
        if let Some(id) = lookup("CALENDAR_ID") {
            self.calendar.calendar_id = Some(id);
        }
        if let Some(path) = lookup("CAL_CREDS_PATH") {
            self.calendar.credentials_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("CALSYNC_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(path));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".calsync")
    }

    /// Resolved database path.
    pub fn db_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("calsync.db"))
    }

    /// Resolved session transcript directory.
    pub fn session_log_dir(&self) -> PathBuf {
        self.logging
            .session_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("logs"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError("agent.max_turns must be at least 1".into()));
        }

        if self.calendar.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "calendar.timezone '{}' is not a known IANA timezone",
                self.calendar.timezone
            )));
        }

        if self.calendar.default_duration_hours == 0 {
            return Err(ConfigError::ValidationError(
                "calendar.default_duration_hours must be > 0".into(),
            ));
        }

        if self.calendar.keyword_search_days == 0 {
            return Err(ConfigError::ValidationError(
                "calendar.keyword_search_days must be > 0".into(),
            ));
        }

        if self.prefilter.max_tokens == 0 || self.anthropic.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be > 0".into()));
        }

        for (model, price) in &self.pricing {
            if price.input_per_m < 0.0 || price.output_per_m < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "pricing for '{model}' must not be negative"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.anthropic.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
