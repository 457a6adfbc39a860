//! Configuration management for KBChat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{KbchatError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure for KBChat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote service location
    #[serde(default)]
    pub backend: BackendConfig,
    /// Chat controller behavior
    #[serde(default)]
    pub chat: ChatConfig,
    /// Credential handling
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Remote service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the authenticated chat and history endpoints
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Full URL of the stateless, unauthenticated chat endpoint
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_proxy_url() -> String {
    "http://localhost:3000/api/chat".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            proxy_url: default_proxy_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Whether sends are persisted as sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Authenticated sends stored in named sessions
    #[default]
    Persistent,
    /// Single-turn sends through the unauthenticated endpoint
    Stateless,
}

impl FromStr for ChatMode {
    type Err = KbchatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "persistent" => Ok(ChatMode::Persistent),
            "stateless" => Ok(ChatMode::Stateless),
            other => Err(KbchatError::Config(format!(
                "Invalid chat mode: {other}. Must be one of: persistent, stateless"
            ))),
        }
    }
}

/// What a send does while another send is still pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitPolicy {
    /// Drop the new send; the pending one continues
    #[default]
    Ignore,
    /// Discard the pending send and its turn; the new send replaces it
    Supersede,
}

impl FromStr for SubmitPolicy {
    type Err = KbchatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Ok(SubmitPolicy::Ignore),
            "supersede" => Ok(SubmitPolicy::Supersede),
            other => Err(KbchatError::Config(format!(
                "Invalid submit policy: {other}. Must be one of: ignore, supersede"
            ))),
        }
    }
}

/// Chat controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Persistent or stateless sends
    #[serde(default)]
    pub mode: ChatMode,

    /// Handling of a send issued while another is pending
    ///
    /// Only matters to callers that overlap sends; the interactive chat
    /// awaits each answer before reading the next line.
    #[serde(default)]
    pub submit_policy: SubmitPolicy,

    /// Placeholder text shown while an answer is pending
    #[serde(default = "default_thinking_text")]
    pub thinking_text: String,

    /// Text that replaces the placeholder when a send fails
    #[serde(default = "default_apology_text")]
    pub apology_text: String,

    /// Characters kept in locally computed session previews
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
}

fn default_thinking_text() -> String {
    "Thinking...".to_string()
}

fn default_apology_text() -> String {
    "Sorry, something went wrong while processing your question.".to_string()
}

fn default_preview_length() -> usize {
    100
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: ChatMode::default(),
            submit_policy: SubmitPolicy::default(),
            thinking_text: default_thinking_text(),
            apology_text: default_apology_text(),
            preview_length: default_preview_length(),
        }
    }
}

/// Where the credential is kept between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStoreKind {
    /// OS keyring
    #[default]
    Keyring,
    /// Process memory only
    Memory,
}

impl FromStr for CredentialStoreKind {
    type Err = KbchatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyring" => Ok(CredentialStoreKind::Keyring),
            "memory" => Ok(CredentialStoreKind::Memory),
            other => Err(KbchatError::Config(format!(
                "Invalid credential store: {other}. Must be one of: keyring, memory"
            ))),
        }
    }
}

/// Credential configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Credential store backend
    #[serde(default)]
    pub credential_store: CredentialStoreKind,

    /// Keyring account name
    #[serde(default = "default_account")]
    pub account: String,

    /// Check the stored credential against the service at startup
    #[serde(default = "default_verify_on_startup")]
    pub verify_on_startup: bool,
}

fn default_account() -> String {
    "default".to_string()
}

fn default_verify_on_startup() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credential_store: CredentialStoreKind::default(),
            account: default_account(),
            verify_on_startup: default_verify_on_startup(),
        }
    }
}

impl Config {
    /// Load configuration from file, environment variables, and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line, for overrides
    ///
    /// # Errors
    ///
    /// Returns [`KbchatError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| KbchatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| KbchatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("KBCHAT_BACKEND_URL") {
            self.backend.base_url = base_url;
        }

        if let Ok(proxy_url) = std::env::var("KBCHAT_PROXY_URL") {
            self.backend.proxy_url = proxy_url;
        }

        if let Ok(timeout) = std::env::var("KBCHAT_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.backend.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid KBCHAT_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(mode) = std::env::var("KBCHAT_CHAT_MODE") {
            match mode.parse() {
                Ok(value) => self.chat.mode = value,
                Err(e) => tracing::warn!("Ignoring KBCHAT_CHAT_MODE: {}", e),
            }
        }

        if let Ok(policy) = std::env::var("KBCHAT_SUBMIT_POLICY") {
            match policy.parse() {
                Ok(value) => self.chat.submit_policy = value,
                Err(e) => tracing::warn!("Ignoring KBCHAT_SUBMIT_POLICY: {}", e),
            }
        }

        if let Ok(store) = std::env::var("KBCHAT_CREDENTIAL_STORE") {
            match store.parse() {
                Ok(value) => self.auth.credential_store = value,
                Err(e) => tracing::warn!("Ignoring KBCHAT_CREDENTIAL_STORE: {}", e),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.backend_url {
            tracing::debug!("Using backend URL override: {}", base_url);
            self.backend.base_url = base_url.clone();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`KbchatError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        validate_http_url("backend.base_url", &self.backend.base_url)?;
        validate_http_url("backend.proxy_url", &self.backend.proxy_url)?;

        if self.backend.timeout_seconds == 0 {
            return Err(KbchatError::Config(
                "backend.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.thinking_text.trim().is_empty() {
            return Err(
                KbchatError::Config("chat.thinking_text cannot be empty".to_string()).into(),
            );
        }

        if self.chat.apology_text.trim().is_empty() {
            return Err(
                KbchatError::Config("chat.apology_text cannot be empty".to_string()).into(),
            );
        }

        if self.chat.preview_length == 0 {
            return Err(KbchatError::Config(
                "chat.preview_length must be greater than 0".to_string(),
            )
            .into());
        }

        if self.auth.account.trim().is_empty() {
            return Err(KbchatError::Config("auth.account cannot be empty".to_string()).into());
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value)
        .map_err(|e| KbchatError::Config(format!("{field} is not a valid URL: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(KbchatError::Config(format!(
            "{field} must use http or https, got {}",
            url.scheme()
        ))
        .into());
    }
    Ok(())
}
