//! Session management against the remote history store
//!
//! [`HistoryClient`] turns session intents (list, load, new, delete, rename)
//! into remote history calls and folds the results into the shared
//! [`SessionStore`](crate::store::SessionStore).
//!
//! Every operation needs a credential. Without one it returns at once and
//! makes no network call. A 401 runs the auth gateway's rejection callback;
//! any other failure is logged and leaves the store untouched. No error
//! escapes the public methods.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::api::ChatBackend;
use crate::auth::{AuthGateway, Credential};
use crate::store::{lock, ChatSession, SessionId, SharedState};

/// Orders concurrent [`HistoryClient::load_session`] calls
///
/// Tickets are issued in call order. Only the store-lock holder reads or
/// writes `applied` and `applied_epoch`, so the pair stays consistent.
#[derive(Debug, Default)]
struct LoadOrder {
    issued: AtomicU64,
    applied: AtomicU64,
    applied_epoch: AtomicU64,
}

impl LoadOrder {
    fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether a load with `ticket`, begun at epoch `started_at`, may apply
    ///
    /// A newer load that already applied wins. Otherwise the conversation
    /// must be untouched since the load began, or last replaced by an older
    /// load applying. A newer load that failed does not block this one.
    fn admits(&self, ticket: u64, started_at: u64, epoch_now: u64) -> bool {
        if self.applied.load(Ordering::SeqCst) > ticket {
            return false;
        }
        epoch_now == started_at || epoch_now == self.applied_epoch.load(Ordering::SeqCst)
    }

    fn record(&self, ticket: u64, epoch_after: u64) {
        self.applied.store(ticket, Ordering::SeqCst);
        self.applied_epoch.store(epoch_after, Ordering::SeqCst);
    }
}

/// Session CRUD over the remote history store
#[derive(Clone)]
pub struct HistoryClient {
    backend: Arc<dyn ChatBackend>,
    auth: AuthGateway,
    state: SharedState,
    loads: Arc<LoadOrder>,
}

impl HistoryClient {
    /// Creates a client mutating `state`
    pub fn new(backend: Arc<dyn ChatBackend>, auth: AuthGateway, state: SharedState) -> Self {
        Self {
            backend,
            auth,
            state,
            loads: Arc::new(LoadOrder::default()),
        }
    }

    fn credential(&self, operation: &str) -> Option<Credential> {
        let credential = self.auth.credential();
        if credential.is_none() {
            tracing::debug!(operation, "no credential; skipping history call");
        }
        credential
    }

    /// Fetches the session list and replaces the local one
    ///
    /// Returns the list held by the store afterwards, which is the previous
    /// list when the fetch fails.
    pub async fn list_sessions(&self) -> Vec<ChatSession> {
        let Some(credential) = self.credential("list_sessions") else {
            return lock(&self.state).sessions().to_vec();
        };

        let result = self
            .auth
            .intercept(self.backend.list_sessions(&credential).await);

        let mut store = lock(&self.state);
        match result {
            Ok(sessions) => {
                tracing::debug!(count = sessions.len(), "session list refreshed");
                store.set_sessions(sessions);
            }
            Err(e) => tracing::warn!("failed to list sessions: {e:#}"),
        }
        store.sessions().to_vec()
    }

    /// Makes session `id` the active conversation
    ///
    /// Any send in flight is abandoned. The result is dropped, returning
    /// `false`, when a newer load has already applied or the conversation
    /// was replaced (new session, deleted session) while this one was
    /// pending. A newer load that fails leaves this one free to apply.
    pub async fn load_session(&self, id: SessionId) -> bool {
        let Some(credential) = self.credential("load_session") else {
            return false;
        };

        let ticket = self.loads.issue();
        let epoch = lock(&self.state).conversation_epoch();

        let result = self
            .auth
            .intercept(self.backend.get_session(&credential, id).await);

        let detail = match result {
            Ok(detail) => detail,
            Err(e) => {
                tracing::warn!(session_id = id, "failed to load session: {e:#}");
                return false;
            }
        };

        let mut store = lock(&self.state);
        if !self.loads.admits(ticket, epoch, store.conversation_epoch()) {
            tracing::debug!(session_id = id, "discarding stale session load");
            return false;
        }
        tracing::info!(
            session_id = detail.id,
            messages = detail.messages.len(),
            "loaded session"
        );
        store.set_active_conversation(Some(detail.id), detail.messages);
        self.loads.record(ticket, store.conversation_epoch());
        true
    }

    /// Starts a fresh, unsaved conversation
    ///
    /// Purely local; the session is created remotely by its first send.
    pub fn create_new_session(&self) {
        lock(&self.state).set_active_conversation(None, Vec::new());
        tracing::debug!("started new conversation");
    }

    /// Deletes session `id`, resetting the conversation if it was active
    pub async fn delete_session(&self, id: SessionId) -> bool {
        let Some(credential) = self.credential("delete_session") else {
            return false;
        };

        let result = self
            .auth
            .intercept(self.backend.delete_session(&credential, id).await);

        if let Err(e) = result {
            tracing::warn!(session_id = id, "failed to delete session: {e:#}");
            return false;
        }

        let mut store = lock(&self.state);
        store.remove_session(id);
        if store.active_session_id() == Some(id) {
            store.set_active_conversation(None, Vec::new());
        }
        tracing::info!(session_id = id, "deleted session");
        true
    }

    /// Renames session `id`
    ///
    /// The local title changes immediately and is restored if the remote
    /// rename fails. Blank titles are rejected without a call.
    pub async fn rename_session(&self, id: SessionId, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            tracing::debug!(session_id = id, "ignoring blank session title");
            return false;
        }
        let Some(credential) = self.credential("rename_session") else {
            return false;
        };

        let previous = lock(&self.state).rename_session(id, title);

        let result = self
            .auth
            .intercept(self.backend.rename_session(&credential, id, title).await);

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id = id, "failed to rename session: {e:#}");
                if let Some(previous) = previous {
                    let mut store = lock(&self.state);
                    if store.session(id).is_some_and(|s| s.title == title) {
                        store.rename_session(id, previous);
                    }
                }
                false
            }
        }
    }

    /// Reloads the active session from the remote store
    ///
    /// Returns `false` when the active conversation is unsaved.
    pub async fn refresh_active(&self) -> bool {
        let active = lock(&self.state).active_session_id();
        match active {
            Some(id) => self.load_session(id).await,
            None => false,
        }
    }
}

impl std::fmt::Debug for HistoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryClient")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}
