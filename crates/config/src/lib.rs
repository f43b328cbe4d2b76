//! Configuration loading, validation, and management for cadence.
//!
//! Loads configuration from `~/.cadence/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.cadence/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Conversation loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool result cache policy
    #[serde(default)]
    pub cache: CacheConfig,

    /// Tool-call approval
    #[serde(default)]
    pub permissions: PermissionsConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Cumulative token budget for one run; unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> u32 {
    50
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_tokens: None,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// TTL for cacheable tools with no entry in the TTL table.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Per-tool TTL overrides, merged over the built-in table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tool_ttl_secs: BTreeMap<String, u64>,

    /// Extra tool names that must never be cached.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_cacheable: Vec<String>,
}

fn default_cache_max_size() -> usize {
    100
}
fn default_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            default_ttl_secs: default_ttl_secs(),
            tool_ttl_secs: BTreeMap::new(),
            non_cacheable: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Auto-approve MEDIUM-risk tools for the session.
    #[serde(default)]
    pub session_override: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Environment variables override the file:
    /// - `CADENCE_MAX_ITERATIONS`
    /// - `CADENCE_MAX_TOKENS`
    /// - `CADENCE_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from an environment lookup (highest priority).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CADENCE_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_env("CADENCE_MAX_ITERATIONS", &raw)?;
        }
        if let Some(raw) = lookup("CADENCE_MAX_TOKENS") {
            self.agent.max_tokens = Some(parse_env("CADENCE_MAX_TOKENS", &raw)?);
        }
        if let Some(level) = lookup("CADENCE_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cadence")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if self.agent.max_tokens == Some(0) {
            return Err(ConfigError::ValidationError(
                "agent.max_tokens must be > 0 when set".into(),
            ));
        }

        if self.cache.max_size == 0 {
            return Err(ConfigError::ValidationError(
                "cache.max_size must be > 0".into(),
            ));
        }

        if self.cache.default_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.default_ttl_secs must be > 0".into(),
            ));
        }

        if let Some((tool, _)) = self.cache.tool_ttl_secs.iter().find(|(_, ttl)| **ttl == 0) {
            return Err(ConfigError::ValidationError(format!(
                "cache.tool_ttl_secs.{tool} must be > 0"
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        Self::default().to_toml()
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{key} must be a positive integer, got '{raw}'"))
    })
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
