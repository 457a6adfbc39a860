//! Error types for KBChat
//!
//! This module defines the error taxonomy used by the chat controller and
//! its collaborators, using `thiserror` for ergonomic error handling.
//!
//! Errors are carried inside [`anyhow::Error`] (see [`Result`]); callers
//! that need to branch on the failure class use
//! `err.downcast_ref::<KbchatError>()` or the helpers on [`KbchatError`].

use thiserror::Error;

/// Main error type for KBChat operations
///
/// Remote-call failures are classified so that the request coordinator and
/// the history client can decide between the authentication-rejection path
/// and the generic failure path without inspecting raw transport errors.
#[derive(Error, Debug)]
pub enum KbchatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-level failure (connection refused, timeout, aborted body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service answered with a non-success status
    #[error("Remote service returned HTTP {status}: {message}")]
    Status {
        /// The HTTP status code returned
        status: u16,
        /// Short description of the failed call
        message: String,
    },

    /// The remote service rejected the bearer credential (HTTP 401)
    #[error("Authentication rejected: {0}")]
    Unauthorized(String),

    /// No credential is available for an authenticated call
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// A response body could not be decoded into the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// A session operation against the history store did not complete
    #[error("Session operation failed: {0}")]
    Session(String),

    /// Local input was rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl KbchatError {
    /// Returns `true` when `err` wraps a [`KbchatError::Unauthorized`].
    ///
    /// # Examples
    ///
    /// ```
    /// use kbchat::error::KbchatError;
    ///
    /// let err = anyhow::anyhow!(KbchatError::Unauthorized("expired".into()));
    /// assert!(KbchatError::is_unauthorized(&err));
    ///
    /// let other = anyhow::anyhow!(KbchatError::Transport("refused".into()));
    /// assert!(!KbchatError::is_unauthorized(&other));
    /// ```
    pub fn is_unauthorized(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<KbchatError>(),
            Some(KbchatError::Unauthorized(_))
        )
    }
}

/// Result type alias for KBChat operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
