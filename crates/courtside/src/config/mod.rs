use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CourtsideError, Result};

/// Environment variable that overrides `provider.kind`
pub const PROVIDER_ENV: &str = "COURTSIDE_PROVIDER";

/// Main configuration structure for Courtside
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// History storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Conversation behaviour
    #[serde(default)]
    pub assistant: AssistantConfig,
    /// Active LLM provider and per-provider settings
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Per-identity request cap
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Moderation pre-check
    #[serde(default)]
    pub moderation: ModerationConfig,
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| CourtsideError::Config(format!("Failed to parse config: {e}")))
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CourtsideError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Load configuration from an explicit path or the default locations
    ///
    /// Falls back to defaults when no file exists. Environment overrides are
    /// applied afterwards.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                Self::from_file(path)?
            }
            None => match default_config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => {
                    tracing::info!("Loading config from: {}", path.display());
                    Self::from_file(&path)?
                }
                None => {
                    tracing::info!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        if let Ok(kind) = std::env::var(PROVIDER_ENV) {
            config.apply_provider_override(&kind)?;
        }

        Ok(config)
    }

    /// Replace the configured provider kind, e.g. from `COURTSIDE_PROVIDER`
    pub fn apply_provider_override(&mut self, kind: &str) -> Result<()> {
        let kind = ProviderKind::from_str(kind)?;
        tracing::info!("Provider overridden from environment: {}", kind.as_str());
        self.provider.kind = kind;
        Ok(())
    }
}

/// Candidate config files, in lookup order
pub fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".courtside").join("config.toml")),
        dirs::config_dir().map(|c| c.join("courtside").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:5000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Number of exchanges returned by the history endpoint
    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,
    /// Take the rate-limit source from `X-Forwarded-For` instead of the peer
    /// address. Only safe behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            history_page_size: default_history_page_size(),
            trust_forwarded_for: false,
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_history_page_size() -> usize {
    20
}

/// Which history store backs the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// History storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: StorageBackend,
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".courtside").join("history.db"))
        .unwrap_or_else(|| PathBuf::from("courtside_history.db"))
}

/// Conversation behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    /// Number of prior exchanges sent to the provider as context
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Replaces the built-in sports-injury system prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            system_prompt: None,
        }
    }
}

fn default_history_limit() -> usize {
    10
}

/// The four supported provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Cloud chat-completions API
    #[default]
    Openai,
    /// Local OpenAI-compatible endpoint
    Local,
    /// Hosted inference API taking a single prompt string
    Hosted,
    /// Third-party chat API
    ThirdParty,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Local => "local",
            ProviderKind::Hosted => "hosted",
            ProviderKind::ThirdParty => "third_party",
        }
    }

    /// Built-in endpoint settings for this provider
    pub fn default_endpoint(&self) -> EndpointConfig {
        match self {
            ProviderKind::Openai => default_openai_endpoint(),
            ProviderKind::Local => default_local_endpoint(),
            ProviderKind::Hosted => default_hosted_endpoint(),
            ProviderKind::ThirdParty => default_third_party_endpoint(),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = CourtsideError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "openai" | "cloud" => Ok(ProviderKind::Openai),
            "local" => Ok(ProviderKind::Local),
            "hosted" | "huggingface" => Ok(ProviderKind::Hosted),
            "third_party" | "cohere" => Ok(ProviderKind::ThirdParty),
            other => Err(CourtsideError::Config(format!(
                "Unknown provider '{other}' (expected openai, local, hosted or third_party)"
            ))),
        }
    }
}

/// Provider selection and shared generation settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Active provider
    #[serde(default)]
    pub kind: ProviderKind,
    /// Upper bound for a single provider call
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_openai_endpoint")]
    pub openai: EndpointConfig,
    #[serde(default = "default_local_endpoint")]
    pub local: EndpointConfig,
    #[serde(default = "default_hosted_endpoint")]
    pub hosted: EndpointConfig,
    #[serde(default = "default_third_party_endpoint")]
    pub third_party: EndpointConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            timeout_secs: default_provider_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            openai: default_openai_endpoint(),
            local: default_local_endpoint(),
            hosted: default_hosted_endpoint(),
            third_party: default_third_party_endpoint(),
        }
    }
}

impl ProviderConfig {
    /// Endpoint settings of the active provider, gaps filled from its defaults
    pub fn active_endpoint(&self) -> EndpointConfig {
        let configured = match self.kind {
            ProviderKind::Openai => &self.openai,
            ProviderKind::Local => &self.local,
            ProviderKind::Hosted => &self.hosted,
            ProviderKind::ThirdParty => &self.third_party,
        };
        configured.or_defaults(&self.kind.default_endpoint())
    }
}

fn default_provider_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.7
}

/// Base URL, model and credential source for one provider
///
/// Fields left out of a TOML table are empty; the factory fills them with
/// the provider's defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EndpointConfig {
    /// Base URL of the API
    #[serde(default)]
    pub api_url: Option<String>,
    /// Model identifier
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl EndpointConfig {
    fn with_defaults(api_url: &str, model: &str, api_key_env: &str) -> Self {
        Self {
            api_url: Some(api_url.to_string()),
            model: Some(model.to_string()),
            api_key_env: Some(api_key_env.to_string()),
        }
    }

    /// Fill unset fields from `defaults`
    pub fn or_defaults(&self, defaults: &EndpointConfig) -> EndpointConfig {
        EndpointConfig {
            api_url: self.api_url.clone().or_else(|| defaults.api_url.clone()),
            model: self.model.clone().or_else(|| defaults.model.clone()),
            api_key_env: self
                .api_key_env
                .clone()
                .or_else(|| defaults.api_key_env.clone()),
        }
    }

    /// Read the API key from the configured environment variable
    ///
    /// Empty values count as missing.
    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|k| !k.trim().is_empty())
    }
}

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:1234/v1";
pub const DEFAULT_HOSTED_URL: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_THIRD_PARTY_URL: &str = "https://api.cohere.ai/v1";

fn default_openai_endpoint() -> EndpointConfig {
    EndpointConfig::with_defaults(DEFAULT_OPENAI_URL, "gpt-3.5-turbo", "OPENAI_API_KEY")
}

fn default_local_endpoint() -> EndpointConfig {
    EndpointConfig::with_defaults(DEFAULT_LOCAL_URL, "local-model", "LOCAL_LLM_API_KEY")
}

fn default_hosted_endpoint() -> EndpointConfig {
    EndpointConfig::with_defaults(
        DEFAULT_HOSTED_URL,
        "mistralai/Mistral-7B-Instruct-v0.2",
        "HF_API_TOKEN",
    )
}

fn default_third_party_endpoint() -> EndpointConfig {
    EndpointConfig::with_defaults(DEFAULT_THIRD_PARTY_URL, "command", "COHERE_API_KEY")
}

/// Sliding-window rate limit configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per identity within the window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    60
}

/// Moderation pre-check configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModerationConfig {
    /// Enable the moderation pre-check
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the OpenAI-compatible moderation API
    #[serde(default = "default_moderation_api_url")]
    pub api_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_moderation_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in seconds
    #[serde(default = "default_moderation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_moderation_api_url(),
            api_key_env: default_moderation_api_key_env(),
            timeout_secs: default_moderation_timeout_secs(),
        }
    }
}

fn default_moderation_api_url() -> String {
    DEFAULT_OPENAI_URL.to_string()
}

fn default_moderation_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_moderation_timeout_secs() -> u64 {
    10
}
