//! Configuration loading from deckhand.toml.

use runtime::{AnthropicAuth, EngineOptions, ProviderConfig, RegistryOptions};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

/// Environment variable consulted when the file carries no credentials.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Backend configuration.
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Tool providers, connected in this order.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Backend provider configuration.
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Model to use.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Standard Anthropic API key (sk-ant-api01-...).
    /// Mutually exclusive with oauth_token.
    pub api_key: Option<String>,

    /// Claude Code OAuth token (sk-ant-oat-...).
    /// Mutually exclusive with api_key.
    pub oauth_token: Option<String>,

    /// Optional system prompt.
    pub system: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key: None,
            oauth_token: None,
            system: None,
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    2024
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationConfig {
    /// Model calls allowed per query; unlimited when absent.
    pub max_turns: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    runtime::DEFAULT_TOOL_TIMEOUT.as_secs()
}

fn default_handshake_timeout_secs() -> u64 {
    mcp::DEFAULT_TIMEOUT.as_secs()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Build the authentication from config, falling back to
    /// `ANTHROPIC_API_KEY`.
    pub fn auth(&self) -> Result<AnthropicAuth, ConfigError> {
        self.resolve_auth(std::env::var(API_KEY_ENV).ok())
    }

    fn resolve_auth(&self, env_key: Option<String>) -> Result<AnthropicAuth, ConfigError> {
        match (&self.backend.api_key, &self.backend.oauth_token) {
            (Some(key), None) => Ok(AnthropicAuth::ApiKey(key.clone())),
            (None, Some(token)) => Ok(AnthropicAuth::ClaudeCodeOauth(token.clone())),
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousAuth),
            (None, None) => env_key
                .filter(|key| !key.is_empty())
                .map(AnthropicAuth::ApiKey)
                .ok_or(ConfigError::MissingAuth),
        }
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            tool_timeout: Duration::from_secs(self.tools.timeout_secs),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.handshake_timeout_secs)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            max_turns: self.conversation.max_turns,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error(
        "authentication not configured: set backend.api_key, backend.oauth_token or ANTHROPIC_API_KEY"
    )]
    MissingAuth,

    #[error(
        "ambiguous authentication: set either backend.api_key OR backend.oauth_token, not both"
    )]
    AmbiguousAuth,
}
