//! Wire shapes of the remote answering and history service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{ChatMessage, SessionId};

/// Body of `POST /chat-history`
///
/// `session_id` is serialized as `null` for an unsaved conversation, which
/// asks the service to create a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    /// The user's question
    pub question: String,
    /// Target session, `None` to create one
    pub session_id: Option<SessionId>,
}

/// Response of `POST /chat-history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    /// Answer text
    pub answer: String,
    /// Image references, empty when omitted
    #[serde(default)]
    pub images: Vec<String>,
    /// Video references, empty when omitted
    #[serde(default)]
    pub videos: Vec<String>,
    /// Session the exchange was stored in
    pub session_id: SessionId,
}

/// Body of the stateless `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatelessAskRequest {
    /// The user's question
    pub question: String,
}

/// Response of the stateless `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatelessAnswer {
    /// Answer text
    pub answer: String,
    /// Image references
    #[serde(default)]
    pub images: Vec<String>,
    /// Video references
    #[serde(default)]
    pub videos: Vec<String>,
}

/// Response of `GET /history/sessions/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    /// Session identifier
    pub id: SessionId,
    /// Session title
    pub title: String,
    /// Creation time
    #[serde(deserialize_with = "crate::store::types::deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(deserialize_with = "crate::store::types::deserialize_timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Full ordered history
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Body of `PUT /history/sessions/{id}/title`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleUpdate {
    /// New title
    pub title: String,
}

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    /// Account email
    pub email: &'a str,
    /// Account password
    pub password: &'a str,
}

/// Response of `POST /auth/login`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token
    pub access_token: String,
    /// Token type reported by the service
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Body of `POST /auth/register`
///
/// `full_name` is left out of the body when not given.
#[derive(Clone, Serialize)]
pub struct Registration {
    /// Account email
    pub email: String,
    /// Public user name
    pub username: String,
    /// Account password
    pub password: String,
    /// Optional display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("full_name", &self.full_name)
            .finish()
    }
}

/// Account profile returned by `POST /auth/register` and `GET /auth/me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Account identifier
    pub id: i64,
    /// Account email
    pub email: String,
    /// Public user name
    pub username: String,
    /// Display name, if set
    #[serde(default)]
    pub full_name: Option<String>,
    /// Whether the account may log in
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}
