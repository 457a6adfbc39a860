//! Facade wiring the chat controller together
//!
//! [`ChatClient`] owns one shared [`SessionStore`], one backend and one
//! [`AuthGateway`], and hands out a [`RequestCoordinator`] and a
//! [`HistoryClient`] that operate over them. Presentation code talks to the
//! client and re-reads [`ChatClient::snapshot`] after every operation.

use std::sync::Arc;

use crate::api::{ChatBackend, HttpBackend};
use crate::auth::AuthGateway;
use crate::config::{ChatConfig, Config};
use crate::coordinator::{RequestCoordinator, SendOutcome};
use crate::error::Result;
use crate::history::HistoryClient;
use crate::store::{lock, ConversationSnapshot, SessionStore, SharedState};

/// Entry point for presentation code
///
/// # Examples
///
/// ```no_run
/// use kbchat::auth::{AuthGateway, Credential};
/// use kbchat::client::ChatClient;
/// use kbchat::config::Config;
///
/// # async fn demo() -> kbchat::Result<()> {
/// let config = Config::default();
/// let auth = AuthGateway::with_credential(Credential::bearer("token"));
/// let client = ChatClient::from_config(&config, auth)?;
///
/// client.history().create_new_session();
/// client.send("What is a vector index?").await;
/// for message in client.snapshot().messages {
///     println!("{:?}: {}", message.role, message.content);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChatClient {
    state: SharedState,
    auth: AuthGateway,
    coordinator: RequestCoordinator,
    history: HistoryClient,
}

impl ChatClient {
    /// Wires a client over `backend`
    pub fn new(backend: Arc<dyn ChatBackend>, auth: AuthGateway, config: ChatConfig) -> Self {
        let state = SessionStore::shared();
        let history = HistoryClient::new(backend.clone(), auth.clone(), state.clone());
        let coordinator = RequestCoordinator::new(
            backend,
            auth.clone(),
            state.clone(),
            history.clone(),
            config,
        );
        Self {
            state,
            auth,
            coordinator,
            history,
        }
    }

    /// Wires a client over an [`HttpBackend`] built from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend URLs are invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config, auth: AuthGateway) -> Result<Self> {
        let backend = HttpBackend::from_config(&config.backend)?;
        Ok(Self::new(Arc::new(backend), auth, config.chat.clone()))
    }

    /// Sends `question` in the active conversation
    pub async fn send(&self, question: &str) -> SendOutcome {
        self.coordinator.send(question).await
    }

    /// The request coordinator
    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// The history client
    pub fn history(&self) -> &HistoryClient {
        &self.history
    }

    /// The auth gateway
    pub fn auth(&self) -> &AuthGateway {
        &self.auth
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ConversationSnapshot {
        lock(&self.state).snapshot()
    }
}
