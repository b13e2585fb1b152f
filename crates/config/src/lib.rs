//! Configuration loading, validation, and management for AppForge.
//!
//! Loads configuration from `~/.appforge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use appforge_core::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.appforge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model provider API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model to generate with
    #[serde(default = "default_model")]
    pub model: String,

    /// Max output tokens per model turn
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Extended thinking budget in tokens (0 disables thinking)
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: u32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Transport retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Context cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Change tracker settings
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_max_tokens() -> u32 {
    16_000
}
fn default_thinking_budget() -> u32 {
    4_096
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("thinking_budget", &self.thinking_budget)
            .field("agent", &self.agent)
            .field("retry", &self.retry)
            .field("cache", &self.cache)
            .field("tracker", &self.tracker)
            .field("logging", &self.logging)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model round-trips allowed per conversation
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Timeout for a single model call
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,

    /// Timeout for a single tool call
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Run tool calls on disjoint paths concurrently
    #[serde(default = "default_true")]
    pub parallel_tools: bool,

    /// Text the model emits to declare the application finished
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,
}

fn default_max_iterations() -> u32 {
    8
}
fn default_model_timeout() -> u64 {
    300
}
fn default_tool_timeout() -> u64 {
    60
}
fn default_completion_marker() -> String {
    "<generation_complete/>".into()
}

impl AgentConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            model_timeout_secs: default_model_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            parallel_tools: true,
            completion_marker: default_completion_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_backoff_ms() -> u64 {
    8_000
}

impl RetryConfig {
    /// The retry policy these settings describe.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.initial_backoff_ms))
            .with_multiplier(self.multiplier)
            .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_stable_ttl")]
    pub stable_ttl_secs: u64,

    #[serde(default = "default_semi_stable_ttl")]
    pub semi_stable_ttl_secs: u64,

    #[serde(default = "default_active_ttl")]
    pub active_ttl_secs: u64,

    /// Log a warning when assembled context exceeds this many tokens
    #[serde(default = "default_warn_tokens")]
    pub warn_tokens: usize,

    /// Refuse to send context larger than this many tokens
    #[serde(default = "default_cache_max_tokens")]
    pub max_tokens: usize,

    /// A file edited within this window is volatile
    #[serde(default = "default_volatile_window")]
    pub volatile_window_secs: u64,

    /// A project file unchanged this long is promoted to semi-stable
    #[serde(default = "default_promote_after")]
    pub promote_after_secs: u64,

    /// Entry files (always at least active)
    #[serde(default = "default_entry_files")]
    pub entry_files: Vec<String>,

    /// Path prefixes of shared template material
    #[serde(default = "default_stable_prefixes")]
    pub stable_prefixes: Vec<String>,

    /// Path fragments of configuration-like files
    #[serde(default = "default_semi_stable_patterns")]
    pub semi_stable_patterns: Vec<String>,

    /// Where UI component files live, relative to the workspace
    #[serde(default = "default_components_dir")]
    pub components_dir: String,
}

fn default_stable_ttl() -> u64 {
    3_600
}
fn default_semi_stable_ttl() -> u64 {
    1_800
}
fn default_active_ttl() -> u64 {
    300
}
fn default_warn_tokens() -> usize {
    150_000
}
fn default_cache_max_tokens() -> usize {
    190_000
}
fn default_volatile_window() -> u64 {
    120
}
fn default_promote_after() -> u64 {
    1_800
}
fn default_entry_files() -> Vec<String> {
    vec!["src/App.tsx".into()]
}
fn default_stable_prefixes() -> Vec<String> {
    vec!["src/components/ui/".into(), "templates/".into()]
}
fn default_semi_stable_patterns() -> Vec<String> {
    vec![
        "package.json".into(),
        "tsconfig".into(),
        "vite.config".into(),
        "tailwind.config".into(),
        "postcss.config".into(),
        "index.html".into(),
        "src/lib/".into(),
        "src/hooks/".into(),
    ]
}
fn default_components_dir() -> String {
    "src/components/ui/".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stable_ttl_secs: default_stable_ttl(),
            semi_stable_ttl_secs: default_semi_stable_ttl(),
            active_ttl_secs: default_active_ttl(),
            warn_tokens: default_warn_tokens(),
            max_tokens: default_cache_max_tokens(),
            volatile_window_secs: default_volatile_window(),
            promote_after_secs: default_promote_after(),
            entry_files: default_entry_files(),
            stable_prefixes: default_stable_prefixes(),
            semi_stable_patterns: default_semi_stable_patterns(),
            components_dir: default_components_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Compare-and-set rounds before a write is reported as contended
    #[serde(default = "default_max_cas_attempts")]
    pub max_cas_attempts: u32,

    /// Fingerprint lifetime in the shared store (0 = no expiry)
    #[serde(default)]
    pub fingerprint_ttl_secs: u64,
}

fn default_max_cas_attempts() -> u32 {
    8
}

impl TrackerConfig {
    pub fn cas_policy(&self) -> RetryPolicy {
        RetryPolicy::immediate(self.max_cas_attempts)
    }

    pub fn fingerprint_ttl(&self) -> Option<Duration> {
        (self.fingerprint_ttl_secs > 0).then(|| Duration::from_secs(self.fingerprint_ttl_secs))
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_cas_attempts: default_max_cas_attempts(),
            fingerprint_ttl_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
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
    /// Priority: env vars > config file > defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
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

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("APPFORGE_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("APPFORGE_MODEL") {
            self.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".appforge")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 || self.agent.max_iterations > 50 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be between 1 and 50".into(),
            ));
        }

        if self.thinking_budget > 0 && self.thinking_budget >= self.max_tokens {
            return Err(ConfigError::ValidationError(
                "thinking_budget must be smaller than max_tokens".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.cache.warn_tokens > self.cache.max_tokens {
            return Err(ConfigError::ValidationError(
                "cache.warn_tokens must not exceed cache.max_tokens".into(),
            ));
        }

        let ttls = [
            self.cache.stable_ttl_secs,
            self.cache.semi_stable_ttl_secs,
            self.cache.active_ttl_secs,
        ];
        if ttls.windows(2).any(|w| w[0] < w[1]) {
            return Err(ConfigError::ValidationError(
                "cache TTLs must not grow from stable to active".into(),
            ));
        }

        if self.tracker.max_cas_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "tracker.max_cas_attempts must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            thinking_budget: default_thinking_budget(),
            agent: AgentConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            tracker: TrackerConfig::default(),
            logging: LoggingConfig::default(),
        }
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
