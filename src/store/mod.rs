//! Client-side view of sessions and the active conversation
//!
//! [`SessionStore`] is a plain state container. It is mutated only by the
//! request coordinator and the history client, which share it behind a
//! [`SharedState`] handle and never hold the lock across an `.await`.
//! Presentation code reads it through [`ConversationSnapshot`].

use std::sync::{Arc, Mutex, MutexGuard};

pub mod in_flight;
pub mod types;

pub use in_flight::{InFlightSend, SendToken};
pub use types::{preview_of, ChatMessage, ChatSession, MessagePatch, Role, SessionId};

/// Store handle shared by the coordinator and the history client
pub type SharedState = Arc<Mutex<SessionStore>>;

/// Locks the shared store, recovering the data if a holder panicked
pub(crate) fn lock(state: &SharedState) -> MutexGuard<'_, SessionStore> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Canonical client-side state
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Vec<ChatSession>,
    active_session_id: Option<SessionId>,
    messages: Vec<ChatMessage>,
    placeholders: Vec<String>,
    in_flight: Option<InFlightSend>,
    last_generation: u64,
    conversation_epoch: u64,
}

impl SessionStore {
    /// Creates an empty store with an unsaved active conversation
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a fresh store in a [`SharedState`] handle
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::new()))
    }

    // -----------------------------------------------------------------------
    // Active conversation
    // -----------------------------------------------------------------------

    /// Replaces the active conversation wholesale
    ///
    /// Any send still in flight belongs to the conversation being replaced;
    /// it is abandoned so its eventual result cannot apply.
    pub fn set_active_conversation(
        &mut self,
        session_id: Option<SessionId>,
        messages: Vec<ChatMessage>,
    ) {
        self.abandon_send();
        self.active_session_id = session_id;
        self.messages = messages;
        self.placeholders.clear();
        self.conversation_epoch += 1;
    }

    /// Appends a message, preserving arrival order
    pub fn append_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Appends an assistant placeholder awaiting its answer
    ///
    /// The placeholder stops counting as pending once it is replaced.
    pub fn append_placeholder(&mut self, message: ChatMessage) {
        self.placeholders.push(message.id.clone());
        self.messages.push(message);
    }

    /// Merges `patch` into the message with identifier `id`
    ///
    /// Returns `false` (and logs) when the message is gone, which happens
    /// only if the conversation was cleared concurrently.
    pub fn replace_message(&mut self, id: &str, patch: MessagePatch) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.apply(patch);
                self.placeholders.retain(|p| p != id);
                true
            }
            None => {
                tracing::warn!(message_id = %id, "replace_message: message not found");
                false
            }
        }
    }

    /// Drops the given messages from the active conversation
    pub(crate) fn remove_messages(&mut self, ids: &[&str]) {
        self.messages.retain(|m| !ids.contains(&m.id.as_str()));
        self.placeholders.retain(|p| !ids.contains(&p.as_str()));
    }

    /// Adopts a server-assigned id for the active conversation
    pub(crate) fn set_active_session_id(&mut self, id: Option<SessionId>) {
        self.active_session_id = id;
    }

    /// Messages of the active conversation, in order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of placeholders still waiting for an answer
    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    /// Identifier of the active session, `None` while unsaved
    pub fn active_session_id(&self) -> Option<SessionId> {
        self.active_session_id
    }

    /// Counter bumped every time the active conversation is replaced
    pub(crate) fn conversation_epoch(&self) -> u64 {
        self.conversation_epoch
    }

    // -----------------------------------------------------------------------
    // Session list
    // -----------------------------------------------------------------------

    /// Replaces the session list with a fresh remote listing
    pub fn set_sessions(&mut self, sessions: Vec<ChatSession>) {
        self.sessions = sessions;
    }

    /// Inserts or replaces a session entry, keeping list position
    pub fn upsert_session_metadata(&mut self, session: ChatSession) {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session,
            None => self.sessions.push(session),
        }
    }

    /// Removes a session entry, returning it if it was listed
    pub fn remove_session(&mut self, id: SessionId) -> Option<ChatSession> {
        let index = self.sessions.iter().position(|s| s.id == id)?;
        Some(self.sessions.remove(index))
    }

    /// Sets a session's title, returning the previous title if listed
    pub fn rename_session(&mut self, id: SessionId, title: impl Into<String>) -> Option<String> {
        let session = self.sessions.iter_mut().find(|s| s.id == id)?;
        Some(std::mem::replace(&mut session.title, title.into()))
    }

    /// Looks up a listed session
    pub fn session(&self, id: SessionId) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Session list in remote order
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    // -----------------------------------------------------------------------
    // In-flight send
    // -----------------------------------------------------------------------

    /// Whether a send is currently pending
    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The pending send, if any
    pub fn in_flight(&self) -> Option<&InFlightSend> {
        self.in_flight.as_ref()
    }

    /// Mints a token for a new send and marks it as the in-flight one
    ///
    /// Any previous in-flight send is cancelled and returned so the caller
    /// can roll back its messages.
    pub(crate) fn begin_send(
        &mut self,
        user_message_id: String,
        placeholder_id: String,
    ) -> (SendToken, Option<InFlightSend>) {
        let previous = self.abandon_send();
        self.last_generation += 1;
        let token = SendToken::new(self.last_generation);
        self.in_flight = Some(InFlightSend {
            token: token.clone(),
            user_message_id,
            placeholder_id,
        });
        (token, previous)
    }

    /// Whether `generation` still owns the conversation
    pub fn is_current(&self, generation: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| f.token.generation() == generation)
    }

    /// Clears the in-flight send if `generation` is still current
    pub(crate) fn finish_send(&mut self, generation: u64) -> Option<InFlightSend> {
        if self.is_current(generation) {
            self.in_flight.take()
        } else {
            None
        }
    }

    /// Cancels and clears whatever send is in flight
    pub(crate) fn abandon_send(&mut self) -> Option<InFlightSend> {
        let abandoned = self.in_flight.take()?;
        abandoned.token.cancel();
        tracing::debug!(
            generation = abandoned.token.generation(),
            "abandoned in-flight send"
        );
        Some(abandoned)
    }

    /// Owned copy of the state for presentation code
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            session_id: self.active_session_id,
            messages: self.messages.clone(),
            sessions: self.sessions.clone(),
            sending: self.is_sending(),
        }
    }
}

/// Read-only copy of the store taken at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSnapshot {
    /// Active session, `None` while unsaved
    pub session_id: Option<SessionId>,
    /// Active conversation
    pub messages: Vec<ChatMessage>,
    /// Session list in remote order
    pub sessions: Vec<ChatSession>,
    /// Whether a send is pending
    pub sending: bool,
}
