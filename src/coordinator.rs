//! Request coordinator: one logical "send" from question to settled answer
//!
//! A send appends the user's question and an assistant placeholder, mints a
//! [`SendToken`](crate::store::SendToken), issues the remote call and, once
//! it settles, replaces the placeholder with the answer or with the apology
//! text. Only the most recently issued send may touch the conversation:
//!
//! ```text
//!          send()                       answer / error
//!   Idle ----------> Pending -----------------------------> Settled --> Idle
//!                       |                                (Answered | Failed)
//!                       | superseded, session loaded,
//!                       | new session, active deleted
//!                       v
//!                   Discarded
//! ```
//!
//! Cancellation works on two levels. The token's cancellation handle makes
//! the pending `tokio::select!` drop the transport future, which releases
//! the connection. The generation check, done under the store lock right
//! before any result is applied, guarantees that a late result never
//! mutates the conversation.

use std::sync::Arc;

use chrono::Utc;

use crate::api::{AskRequest, ChatBackend, StatelessAskRequest};
use crate::auth::{AuthGateway, Credential};
use crate::config::{ChatConfig, ChatMode, SubmitPolicy};
use crate::error::Result;
use crate::history::HistoryClient;
use crate::store::{
    lock, preview_of, ChatMessage, MessagePatch, SessionId, SessionStore, SharedState,
};

/// Which path a [`RequestCoordinator::send`] call took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The placeholder now holds the answer
    Answered,
    /// The placeholder now holds the apology text
    Failed,
    /// The send was superseded or its conversation abandoned; nothing applied
    Discarded,
    /// Nothing was sent: blank question, missing credential, or a send was
    /// already pending under the `ignore` policy
    Ignored,
}

/// Normalized answer from either chat endpoint
struct Answer {
    text: String,
    images: Vec<String>,
    videos: Vec<String>,
    session_id: Option<SessionId>,
}

/// Clears the in-flight send if the `send` future is dropped mid-call
///
/// `finish_send` only succeeds for the current generation, so the flag is
/// cleared exactly once per send and never by a superseded one.
struct InFlightGuard {
    state: SharedState,
    generation: u64,
    placeholder_id: String,
    apology: String,
    settled: bool,
}

impl InFlightGuard {
    fn settle(&mut self, store: &mut SessionStore) {
        store.finish_send(self.generation);
        self.settled = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut store = lock(&self.state);
        if let Some(abandoned) = store.finish_send(self.generation) {
            abandoned.token.cancel();
            tracing::debug!(
                generation = self.generation,
                "send dropped before completion"
            );
            store.replace_message(
                &self.placeholder_id,
                MessagePatch::content(self.apology.clone()),
            );
        }
    }
}

/// Issues sends against the active conversation
#[derive(Clone)]
pub struct RequestCoordinator {
    backend: Arc<dyn ChatBackend>,
    auth: AuthGateway,
    state: SharedState,
    history: HistoryClient,
    config: ChatConfig,
}

impl RequestCoordinator {
    /// Creates a coordinator mutating `state`
    ///
    /// `history` is used to refresh the session list after the first send of
    /// an unsaved conversation creates its session.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        auth: AuthGateway,
        state: SharedState,
        history: HistoryClient,
        config: ChatConfig,
    ) -> Self {
        Self {
            backend,
            auth,
            state,
            history,
            config,
        }
    }

    /// Chat behavior this coordinator was built with
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Sends `question` in the active conversation
    ///
    /// Never fails: transport and service errors are logged and surface to
    /// the user only as the apology text in the placeholder.
    pub async fn send(&self, question: &str) -> SendOutcome {
        let question = question.trim();
        if question.is_empty() {
            tracing::debug!("ignoring blank question");
            return SendOutcome::Ignored;
        }

        let credential = match self.config.mode {
            ChatMode::Persistent => match self.auth.credential() {
                Some(credential) => Some(credential),
                None => {
                    tracing::debug!("no credential; ignoring send");
                    return SendOutcome::Ignored;
                }
            },
            ChatMode::Stateless => None,
        };

        let (token, placeholder_id, session_id) = {
            let mut store = lock(&self.state);
            if store.is_sending() && self.config.submit_policy == SubmitPolicy::Ignore {
                tracing::debug!("send already pending; ignoring new question");
                return SendOutcome::Ignored;
            }

            let user = ChatMessage::user(question);
            let placeholder = ChatMessage::placeholder(self.config.thinking_text.clone());
            let placeholder_id = placeholder.id.clone();

            let (token, superseded) = store.begin_send(user.id.clone(), placeholder_id.clone());
            if let Some(superseded) = superseded {
                tracing::debug!(
                    generation = superseded.token.generation(),
                    "rolling back superseded send"
                );
                store.remove_messages(&[
                    superseded.user_message_id.as_str(),
                    superseded.placeholder_id.as_str(),
                ]);
            }
            store.append_message(user);
            store.append_placeholder(placeholder);

            (token, placeholder_id, store.active_session_id())
        };

        let generation = token.generation();
        let mut guard = InFlightGuard {
            state: self.state.clone(),
            generation,
            placeholder_id: placeholder_id.clone(),
            apology: self.config.apology_text.clone(),
            settled: false,
        };

        tracing::debug!(generation, ?session_id, "send issued");

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(generation, "send cancelled; transport released");
                return SendOutcome::Discarded;
            }
            result = self.dispatch(question, session_id, credential.as_ref()) => result,
        };

        let result = match self.config.mode {
            ChatMode::Persistent => self.auth.intercept(result),
            ChatMode::Stateless => result,
        };

        let (outcome, created_session) = {
            let mut store = lock(&self.state);
            if !store.is_current(generation) {
                tracing::debug!(generation, "discarding result of superseded send");
                return SendOutcome::Discarded;
            }

            let mut created_session = false;
            let outcome = match result {
                Ok(answer) => {
                    // Stateless answers are never stored, so session metadata stays put.
                    if self.config.mode == ChatMode::Persistent {
                        match (session_id, answer.session_id) {
                            (None, Some(new_id)) => {
                                store.set_active_session_id(Some(new_id));
                                created_session = true;
                                tracing::info!(session_id = new_id, "session created");
                            }
                            (Some(id), _) => self.touch_session(&mut store, id, question),
                            (None, None) => {}
                        }
                    }
                    store.replace_message(
                        &placeholder_id,
                        MessagePatch::answer(answer.text, answer.images, answer.videos),
                    );
                    SendOutcome::Answered
                }
                Err(e) => {
                    tracing::warn!(generation, "send failed: {e:#}");
                    store.replace_message(
                        &placeholder_id,
                        MessagePatch::content(self.config.apology_text.clone()),
                    );
                    SendOutcome::Failed
                }
            };
            guard.settle(&mut store);
            (outcome, created_session)
        };

        if created_session {
            self.history.list_sessions().await;
        }
        outcome
    }

    async fn dispatch(
        &self,
        question: &str,
        session_id: Option<SessionId>,
        credential: Option<&Credential>,
    ) -> Result<Answer> {
        match credential {
            Some(credential) => {
                let request = AskRequest {
                    question: question.to_string(),
                    session_id,
                };
                let response = self.backend.ask(credential, &request).await?;
                Ok(Answer {
                    text: response.answer,
                    images: response.images,
                    videos: response.videos,
                    session_id: Some(response.session_id),
                })
            }
            None => {
                let request = StatelessAskRequest {
                    question: question.to_string(),
                };
                let response = self.backend.ask_stateless(&request).await?;
                Ok(Answer {
                    text: response.answer,
                    images: response.images,
                    videos: response.videos,
                    session_id: None,
                })
            }
        }
    }

    /// Mirrors the remote metadata update for an existing session locally
    fn touch_session(&self, store: &mut SessionStore, id: SessionId, question: &str) {
        let Some(mut session) = store.session(id).cloned() else {
            return;
        };
        session.message_count += 2;
        session.last_message_preview = Some(preview_of(question, self.config.preview_length));
        session.updated_at = Utc::now();
        store.upsert_session_metadata(session);
    }
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("mode", &self.config.mode)
            .field("submit_policy", &self.config.submit_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{Call, Reply, ScriptedBackend};
    use crate::store::Role;
    use std::time::Duration;

    struct Harness {
        coordinator: RequestCoordinator,
        history: HistoryClient,
        backend: Arc<ScriptedBackend>,
        auth: AuthGateway,
        state: SharedState,
    }

    fn harness(config: ChatConfig) -> Harness {
        let backend = Arc::new(ScriptedBackend::new());
        let auth = AuthGateway::with_credential(Credential::bearer("t"));
        let state = SessionStore::shared();
        let history = HistoryClient::new(backend.clone(), auth.clone(), state.clone());
        let coordinator = RequestCoordinator::new(
            backend.clone(),
            auth.clone(),
            state.clone(),
            history.clone(),
            config,
        );
        Harness {
            coordinator,
            history,
            backend,
            auth,
            state,
        }
    }

    fn supersede() -> ChatConfig {
        ChatConfig {
            submit_policy: SubmitPolicy::Supersede,
            ..ChatConfig::default()
        }
    }

    fn contents(state: &SharedState) -> Vec<String> {
        lock(state)
            .messages()
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition should become true");
    }

    #[tokio::test]
    async fn test_send_appends_question_and_answer() {
        let h = harness(ChatConfig::default());
        h.backend.push_reply(Reply::Answer {
            text: "Respuesta".into(),
            images: vec!["fig.png".into()],
            videos: vec![],
        });

        let outcome = h.coordinator.send("  ¿Qué es RAG?  ").await;

        assert_eq!(outcome, SendOutcome::Answered);
        let store = lock(&h.state);
        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "¿Qué es RAG?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Respuesta");
        assert_eq!(messages[1].images, Some(vec!["fig.png".to_string()]));
        assert_eq!(messages[1].videos, Some(vec![]));
        assert!(!store.is_sending());
        assert_eq!(store.placeholder_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_question_is_ignored() {
        let h = harness(ChatConfig::default());
        assert_eq!(h.coordinator.send("   ").await, SendOutcome::Ignored);
        assert_eq!(h.backend.call_count(), 0);
        assert!(lock(&h.state).messages().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential_is_ignored_without_call() {
        let h = harness(ChatConfig::default());
        h.auth.logout();
        assert_eq!(h.coordinator.send("hola").await, SendOutcome::Ignored);
        assert_eq!(h.backend.call_count(), 0);
        assert!(lock(&h.state).messages().is_empty());
    }

    #[tokio::test]
    async fn test_first_send_adopts_session_and_refreshes_list() {
        let h = harness(ChatConfig::default());
        h.history.create_new_session();
        assert!(lock(&h.state).active_session_id().is_none());

        h.coordinator.send("hi").await;

        let snap = lock(&h.state).snapshot();
        let id = snap.session_id.expect("server id should be adopted");
        assert!(snap.sessions.iter().any(|s| s.id == id));
        assert_eq!(
            h.backend.calls()[0],
            Call::Ask(AskRequest {
                question: "hi".into(),
                session_id: None,
            })
        );
        assert_eq!(h.backend.calls()[1], Call::List);
    }

    #[tokio::test]
    async fn test_follow_up_send_reuses_session_and_bumps_metadata() {
        let h = harness(ChatConfig::default());
        h.coordinator.send("first").await;
        let id = lock(&h.state).active_session_id().unwrap();
        let count_before = lock(&h.state).session(id).unwrap().message_count;

        h.coordinator.send("second question").await;

        assert_eq!(
            h.backend.calls().last(),
            Some(&Call::Ask(AskRequest {
                question: "second question".into(),
                session_id: Some(id),
            }))
        );
        let store = lock(&h.state);
        let session = store.session(id).unwrap();
        assert_eq!(session.message_count, count_before + 2);
        assert_eq!(
            session.last_message_preview.as_deref(),
            Some("second question")
        );
    }

    #[tokio::test]
    async fn test_failure_leaves_single_apology_message() {
        let h = harness(ChatConfig::default());
        h.backend.push_reply(Reply::Fail("connection reset".into()));

        let outcome = h.coordinator.send("hola").await;

        assert_eq!(outcome, SendOutcome::Failed);
        let store = lock(&h.state);
        let assistants: Vec<_> = store
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(assistants.len(), 1);
        assert_eq!(assistants[0].content, ChatConfig::default().apology_text);
        assert_eq!(assistants[0].images, Some(vec![]));
        assert_eq!(assistants[0].videos, Some(vec![]));
        assert!(!assistants[0].content.contains("connection reset"));
        assert!(!store.is_sending());
    }

    #[tokio::test]
    async fn test_unauthorized_clears_credential_and_stops_calls() {
        let h = harness(ChatConfig::default());
        h.backend.push_reply(Reply::Unauthorized);

        assert_eq!(h.coordinator.send("hola").await, SendOutcome::Failed);
        assert!(!h.auth.is_authenticated());
        let calls = h.backend.call_count();

        assert_eq!(h.coordinator.send("otra").await, SendOutcome::Ignored);
        h.history.list_sessions().await;
        assert!(!h.history.load_session(1).await);
        assert_eq!(h.backend.call_count(), calls);
    }

    #[tokio::test]
    async fn test_ignore_policy_drops_second_send() {
        let h = harness(ChatConfig::default());
        let (gated, release) = Reply::gated();
        h.backend.push_reply(gated);

        let coordinator = h.coordinator.clone();
        let first = tokio::spawn(async move { coordinator.send("a").await });
        let backend = h.backend.clone();
        wait_until(move || backend.call_count() == 1).await;

        assert_eq!(h.coordinator.send("b").await, SendOutcome::Ignored);
        assert_eq!(h.backend.call_count(), 1);
        assert_eq!(lock(&h.state).placeholder_count(), 1);

        release.send(Reply::text("answer a")).unwrap();
        assert_eq!(first.await.unwrap(), SendOutcome::Answered);
        assert_eq!(contents(&h.state), vec!["a", "answer a"]);
    }

    #[tokio::test]
    async fn test_supersede_reflects_only_latest_send() {
        let h = harness(supersede());
        let (gated_a, release_a) = Reply::gated();
        let (gated_b, release_b) = Reply::gated();
        h.backend.push_reply(gated_a);
        h.backend.push_reply(gated_b);

        let coordinator = h.coordinator.clone();
        let first = tokio::spawn(async move { coordinator.send("a").await });
        let backend = h.backend.clone();
        wait_until(move || backend.call_count() == 1).await;

        let coordinator = h.coordinator.clone();
        let second = tokio::spawn(async move { coordinator.send("b").await });
        let backend = h.backend.clone();
        wait_until(move || backend.call_count() == 2).await;

        assert_eq!(first.await.unwrap(), SendOutcome::Discarded);
        assert_eq!(lock(&h.state).placeholder_count(), 1);

        // The superseded call's transport was dropped, so its gate is closed.
        assert!(release_a.send(Reply::text("late a")).is_err());

        release_b.send(Reply::text("answer b")).unwrap();
        assert_eq!(second.await.unwrap(), SendOutcome::Answered);

        assert_eq!(contents(&h.state), vec!["b", "answer b"]);
        assert!(!lock(&h.state).is_sending());
    }

    #[tokio::test]
    async fn test_placeholder_never_duplicated_across_sends() {
        let h = harness(supersede());
        for question in ["uno", "dos", "tres"] {
            let (gated, release) = Reply::gated();
            h.backend.push_reply(gated);
            let coordinator = h.coordinator.clone();
            let calls = h.backend.call_count();
            let task = tokio::spawn(async move { coordinator.send(question).await });
            let backend = h.backend.clone();
            wait_until(move || backend.call_count() == calls + 1).await;

            assert_eq!(lock(&h.state).placeholder_count(), 1);
            release.send(Reply::text("ok")).unwrap();
            task.await.unwrap();
            assert_eq!(lock(&h.state).placeholder_count(), 0);
        }
        assert_eq!(lock(&h.state).messages().len(), 6);
    }

    #[tokio::test]
    async fn test_new_session_discards_pending_send() {
        let h = harness(ChatConfig::default());
        let (gated, release) = Reply::gated();
        h.backend.push_reply(gated);

        let coordinator = h.coordinator.clone();
        let pending = tokio::spawn(async move { coordinator.send("a").await });
        let backend = h.backend.clone();
        wait_until(move || backend.call_count() == 1).await;

        h.history.create_new_session();

        assert_eq!(pending.await.unwrap(), SendOutcome::Discarded);
        assert!(release.send(Reply::text("late")).is_err());
        let snap = lock(&h.state).snapshot();
        assert!(snap.messages.is_empty());
        assert!(!snap.sending);
    }

    #[tokio::test]
    async fn test_dropped_send_clears_flag_and_apologizes() {
        let h = harness(ChatConfig::default());
        let (gated, _release) = Reply::gated();
        h.backend.push_reply(gated);

        let coordinator = h.coordinator.clone();
        let task = tokio::spawn(async move { coordinator.send("a").await });
        let backend = h.backend.clone();
        wait_until(move || backend.call_count() == 1).await;
        assert!(lock(&h.state).is_sending());

        task.abort();
        let _ = task.await;

        let store = lock(&h.state);
        assert!(!store.is_sending());
        assert_eq!(store.placeholder_count(), 0);
        assert_eq!(
            store.messages()[1].content,
            ChatConfig::default().apology_text
        );
    }

    #[tokio::test]
    async fn test_stateless_mode_uses_proxy_without_credential() {
        let h = harness(ChatConfig {
            mode: ChatMode::Stateless,
            ..ChatConfig::default()
        });
        h.auth.logout();
        h.backend.push_reply(Reply::text("sin sesión"));

        assert_eq!(h.coordinator.send("hola").await, SendOutcome::Answered);

        assert_eq!(h.backend.calls(), vec![Call::AskStateless("hola".into())]);
        let snap = lock(&h.state).snapshot();
        assert!(snap.session_id.is_none());
        assert_eq!(snap.messages[1].content, "sin sesión");
    }

    #[tokio::test]
    async fn test_stateless_send_leaves_loaded_session_metadata_alone() {
        let h = harness(ChatConfig {
            mode: ChatMode::Stateless,
            ..ChatConfig::default()
        });
        let id = h.backend.seed_session("Guardada", &[("q", "a")]);
        h.history.list_sessions().await;
        assert!(h.history.load_session(id).await);
        let before = lock(&h.state).session(id).cloned().unwrap();

        h.backend.push_reply(Reply::text("respuesta"));
        assert_eq!(
            h.coordinator.send("not persisted").await,
            SendOutcome::Answered
        );

        let store = lock(&h.state);
        let after = store.session(id).unwrap();
        assert_eq!(after.message_count, before.message_count);
        assert_eq!(after.last_message_preview, before.last_message_preview);
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.active_session_id(), Some(id));
        assert_eq!(
            h.backend.calls().last(),
            Some(&Call::AskStateless("not persisted".into()))
        );
    }
}
