use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Server-assigned session identifier
pub type SessionId = i64;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A question typed by the user
    User,
    /// An answer (or placeholder) from the answering service
    Assistant,
}

/// A single turn in the active conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Opaque identifier, unique within a session
    #[serde(deserialize_with = "deserialize_message_id")]
    pub id: String,
    /// Author of the message
    pub role: Role,
    /// Text content
    pub content: String,
    /// Image references attached to an answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Video references attached to an answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videos: Option<Vec<String>>,
}

impl ChatMessage {
    /// Creates a user message with a fresh client-side identifier
    ///
    /// # Examples
    ///
    /// ```
    /// use kbchat::store::{ChatMessage, Role};
    ///
    /// let msg = ChatMessage::user("What is a vector index?");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(msg.images.is_none());
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            images: None,
            videos: None,
        }
    }

    /// Creates an assistant placeholder shown while a send is pending
    ///
    /// Placeholders carry empty (not absent) media lists so that a failed
    /// send leaves a well-formed assistant message behind.
    pub fn placeholder(thinking_text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: thinking_text.into(),
            images: Some(Vec::new()),
            videos: Some(Vec::new()),
        }
    }

    /// Merges `patch` into this message; unset patch fields are left alone
    pub fn apply(&mut self, patch: MessagePatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(images) = patch.images {
            self.images = Some(images);
        }
        if let Some(videos) = patch.videos {
            self.videos = Some(videos);
        }
    }
}

/// Partial update applied to a message in place
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    /// Replacement text
    pub content: Option<String>,
    /// Replacement image list
    pub images: Option<Vec<String>>,
    /// Replacement video list
    pub videos: Option<Vec<String>>,
}

impl MessagePatch {
    /// Patch that only replaces the text content
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Patch that replaces content and both media lists
    pub fn answer(content: impl Into<String>, images: Vec<String>, videos: Vec<String>) -> Self {
        Self {
            content: Some(content.into()),
            images: Some(images),
            videos: Some(videos),
        }
    }
}

/// Metadata for a persisted conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Server-assigned identifier
    pub id: SessionId,
    /// User-visible title
    pub title: String,
    /// When the session was created
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    /// When the session was last updated
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Number of messages stored remotely
    #[serde(default)]
    pub message_count: usize,
    /// Truncated text of the last user question
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
}

/// Truncates `text` to `limit` characters, appending `...` when cut
///
/// Mirrors the preview the history store computes for its session listing.
///
/// # Examples
///
/// ```
/// use kbchat::store::preview_of;
///
/// assert_eq!(preview_of("short", 100), "short");
/// assert_eq!(preview_of("abcdef", 3), "abc...");
/// ```
pub fn preview_of(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn deserialize_message_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

/// Accepts RFC 3339 timestamps and offset-less ones (taken as UTC)
pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp: {raw}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_accepts_numeric_id_from_history() {
        let json = r#"{"id": 42, "role": "assistant", "content": "hola", "created_at": "2024-05-01T10:00:00"}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "42");
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.images.is_none());
    }

    #[test]
    fn test_message_accepts_string_id() {
        let json = r#"{"id": "abc", "role": "user", "content": "q", "images": ["a.png"]}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "abc");
        assert_eq!(msg.images, Some(vec!["a.png".to_string()]));
    }

    #[test]
    fn test_placeholder_has_empty_media() {
        let msg = ChatMessage::placeholder("Thinking...");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.images, Some(vec![]));
        assert_eq!(msg.videos, Some(vec![]));
    }

    #[test]
    fn test_apply_content_patch_keeps_media() {
        let mut msg = ChatMessage::placeholder("Thinking...");
        msg.apply(MessagePatch::content("Sorry"));
        assert_eq!(msg.content, "Sorry");
        assert_eq!(msg.images, Some(vec![]));
    }

    #[test]
    fn test_session_parses_naive_timestamps() {
        let json = r#"{
            "id": 7,
            "title": "Vectores",
            "created_at": "2024-05-01T10:00:00.123456",
            "updated_at": "2024-05-01T11:30:00Z",
            "message_count": 4
        }"#;
        let session: ChatSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.id, 7);
        assert_eq!(session.message_count, 4);
        assert!(session.last_message_preview.is_none());
        assert!(session.updated_at > session.created_at);
    }

    #[test]
    fn test_session_rejects_garbage_timestamp() {
        let json = r#"{"id": 1, "title": "t", "created_at": "yesterday", "updated_at": "now"}"#;
        assert!(serde_json::from_str::<ChatSession>(json).is_err());
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        assert_eq!(preview_of("ñandú", 3), "ñan...");
        assert_eq!(preview_of("", 3), "");
    }
}
