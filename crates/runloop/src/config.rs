//! Configuration loading from hawser.toml.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Tool loop limits and scheduling.
    #[serde(default)]
    pub run: RunConfig,

    /// Remote assistant service.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Limits and scheduling for one run of the tool loop.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Maximum "requires action" pauses served before the run is abandoned.
    #[serde(default = "default_max_action_cycles")]
    pub max_action_cycles: u32,

    /// Execute the calls of one batch concurrently.
    #[serde(default = "default_parallel_tools")]
    pub parallel_tools: bool,

    /// Per-call timeout. Unset means tools may run indefinitely.
    #[serde(default)]
    pub tool_timeout_ms: Option<u64>,

    /// Backoff for transient resume failures.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_action_cycles: default_max_action_cycles(),
            parallel_tools: default_parallel_tools(),
            tool_timeout_ms: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl RunConfig {
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Remote assistant service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Falls back to the OPENAI_API_KEY environment variable.
    pub api_key: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
        }
    }
}

impl RemoteConfig {
    /// Resolve the API key from config or environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        std::env::var(API_KEY_ENV).map_err(|_| ConfigError::MissingApiKey)
    }
}

fn default_max_action_cycles() -> u32 {
    16
}

fn default_parallel_tools() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.run.max_action_cycles == 0 {
            return Err(ConfigError::Invalid(
                "run.max_action_cycles must be at least 1".into(),
            ));
        }
        if self.run.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "run.retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("API key not configured: set remote.api_key or OPENAI_API_KEY")]
    MissingApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.run.max_action_cycles, 16);
        assert!(config.run.parallel_tools);
        assert_eq!(config.run.tool_timeout(), None);
        assert_eq!(config.run.retry, RetryPolicy::default());
        assert_eq!(config.remote.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn parses_all_sections() {
        let config = Config::parse(
            r#"
            [run]
            max_action_cycles = 4
            parallel_tools = false
            tool_timeout_ms = 1500

            [run.retry]
            max_attempts = 5
            base_delay_ms = 10

            [remote]
            base_url = "http://localhost:8080/v1"
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        assert_eq!(config.run.max_action_cycles, 4);
        assert!(!config.run.parallel_tools);
        assert_eq!(config.run.tool_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.run.retry.max_attempts, 5);
        assert_eq!(config.run.retry.base_delay_ms, 10);
        assert_eq!(config.run.retry.max_delay_ms, 8_000);
        assert_eq!(config.remote.api_key().unwrap(), "sk-test");
    }

    #[test]
    fn rejects_zero_limits() {
        let err = Config::parse("[run]\nmax_action_cycles = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = Config::parse("[run.retry]\nmax_attempts = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = Config::parse("[run\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(200), Duration::from_millis(1_000));
    }
}
