//! In-process fake of the answering service for unit tests
//!
//! [`ScriptedBackend`] keeps an in-memory history store and answers each
//! `ask` call from a queue of scripted [`Reply`] values. A [`Reply::Gated`]
//! reply parks the call until the test releases it through the paired
//! `oneshot` sender, which lets tests decide exactly when (and in which
//! order) concurrent sends settle. If the call is cancelled first, the
//! receiver is dropped and the test's `send` fails, proving the transport
//! was released.
//!
//! ```text
//! coordinator.send() --ask()--> ScriptedBackend --pop--> Reply
//!                                                   \--> Gated(rx) <-- test tx.send(Reply)
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::oneshot;

use crate::api::{
    AskRequest, AskResponse, AuthApi, ChatBackend, Registration, SessionDetail, StatelessAnswer,
    StatelessAskRequest, UserProfile,
};
use crate::auth::Credential;
use crate::error::{KbchatError, Result};
use crate::store::{preview_of, ChatMessage, ChatSession, Role, SessionId};

/// Scripted outcome of one `ask` call
#[derive(Debug)]
pub enum Reply {
    /// Answer with text and media
    Answer {
        text: String,
        images: Vec<String>,
        videos: Vec<String>,
    },
    /// Fail with a transport error
    Fail(String),
    /// Reject the credential
    Unauthorized,
    /// Wait for the test to supply the real reply
    Gated(oneshot::Receiver<Reply>),
}

impl Reply {
    /// Plain text answer
    pub fn text(text: &str) -> Self {
        Reply::Answer {
            text: text.to_string(),
            images: Vec::new(),
            videos: Vec::new(),
        }
    }

    /// Returns a gated reply and the sender that releases it
    pub fn gated() -> (Self, oneshot::Sender<Reply>) {
        let (tx, rx) = oneshot::channel();
        (Reply::Gated(rx), tx)
    }
}

/// One recorded backend invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Ask(AskRequest),
    AskStateless(String),
    List,
    Get(SessionId),
    Delete(SessionId),
    Rename(SessionId, String),
    Register(String),
    Login(String),
    Verify,
    Me,
}

#[derive(Default)]
struct FakeState {
    sessions: Vec<SessionDetail>,
    next_session_id: SessionId,
    replies: VecDeque<Reply>,
    get_gates: VecDeque<oneshot::Receiver<()>>,
    calls: Vec<Call>,
    unauthorized: bool,
    fail_history: bool,
}

/// Fake service with an in-memory history store
#[derive(Default)]
pub struct ScriptedBackend {
    state: Mutex<FakeState>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_session_id: 1,
                ..FakeState::default()
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    /// Queues the reply for the next `ask`/`ask_stateless` call
    pub fn push_reply(&self, reply: Reply) {
        self.with_state(|s| s.replies.push_back(reply));
    }

    /// Parks the next `get_session` call until the returned sender fires
    pub fn gate_next_get(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with_state(|s| s.get_gates.push_back(rx));
        tx
    }

    /// Makes every call fail with 401 while set
    pub fn set_unauthorized(&self, on: bool) {
        self.with_state(|s| s.unauthorized = on);
    }

    /// Makes history calls fail with a transport error while set
    pub fn set_fail_history(&self, on: bool) {
        self.with_state(|s| s.fail_history = on);
    }

    /// Seeds a stored session with alternating user/assistant messages
    pub fn seed_session(&self, title: &str, exchanges: &[(&str, &str)]) -> SessionId {
        self.with_state(|s| {
            let id = s.next_session_id;
            s.next_session_id += 1;
            let mut messages = Vec::new();
            for (i, (q, a)) in exchanges.iter().enumerate() {
                messages.push(stored_message(id, i * 2, Role::User, q));
                messages.push(stored_message(id, i * 2 + 1, Role::Assistant, a));
            }
            s.sessions.push(SessionDetail {
                id,
                title: title.to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                messages,
            });
            id
        })
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|s| s.calls.clone())
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.with_state(|s| s.calls.len())
    }

    /// Title of a stored session
    pub fn stored_title(&self, id: SessionId) -> Option<String> {
        self.with_state(|s| s.sessions.iter().find(|d| d.id == id).map(|d| d.title.clone()))
    }

    fn record(&self, call: Call) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(call);
            if s.unauthorized {
                Err(KbchatError::Unauthorized("fake".into()).into())
            } else {
                Ok(())
            }
        })
    }

    fn history_guard(&self) -> Result<()> {
        if self.with_state(|s| s.fail_history) {
            return Err(KbchatError::Transport("fake history outage".into()).into());
        }
        Ok(())
    }

    async fn next_reply(&self) -> Reply {
        let reply = self
            .with_state(|s| s.replies.pop_front())
            .unwrap_or_else(|| Reply::text("ok"));
        match reply {
            Reply::Gated(rx) => match rx.await {
                Ok(Reply::Gated(_)) | Err(_) => Reply::Fail("gate closed".into()),
                Ok(inner) => inner,
            },
            other => other,
        }
    }
}

fn stored_message(session: SessionId, index: usize, role: Role, content: &str) -> ChatMessage {
    ChatMessage {
        id: format!("{}", session * 1000 + index as i64),
        role,
        content: content.to_string(),
        images: None,
        videos: None,
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn ask(&self, _credential: &Credential, request: &AskRequest) -> Result<AskResponse> {
        self.record(Call::Ask(request.clone()))?;
        let (text, images, videos) = match self.next_reply().await {
            Reply::Answer {
                text,
                images,
                videos,
            } => (text, images, videos),
            Reply::Fail(msg) => return Err(KbchatError::Transport(msg).into()),
            Reply::Unauthorized => return Err(KbchatError::Unauthorized("fake".into()).into()),
            Reply::Gated(_) => unreachable!("next_reply resolves gates"),
        };

        let session_id = self.with_state(|s| {
            let id = match request.session_id {
                Some(id) => id,
                None => {
                    let id = s.next_session_id;
                    s.next_session_id += 1;
                    s.sessions.push(SessionDetail {
                        id,
                        title: preview_of(&request.question, 50),
                        created_at: Utc::now(),
                        updated_at: Utc::now(),
                        messages: Vec::new(),
                    });
                    id
                }
            };
            if let Some(detail) = s.sessions.iter_mut().find(|d| d.id == id) {
                let n = detail.messages.len();
                detail
                    .messages
                    .push(stored_message(id, n, Role::User, &request.question));
                detail
                    .messages
                    .push(stored_message(id, n + 1, Role::Assistant, &text));
                detail.updated_at = Utc::now();
            }
            id
        });

        Ok(AskResponse {
            answer: text,
            images,
            videos,
            session_id,
        })
    }

    async fn ask_stateless(&self, request: &StatelessAskRequest) -> Result<StatelessAnswer> {
        self.with_state(|s| s.calls.push(Call::AskStateless(request.question.clone())));
        match self.next_reply().await {
            Reply::Answer {
                text,
                images,
                videos,
            } => Ok(StatelessAnswer {
                answer: text,
                images,
                videos,
            }),
            Reply::Fail(msg) => Err(KbchatError::Transport(msg).into()),
            Reply::Unauthorized => Err(KbchatError::Status {
                status: 500,
                message: "proxy".into(),
            }
            .into()),
            Reply::Gated(_) => unreachable!("next_reply resolves gates"),
        }
    }

    async fn list_sessions(&self, _credential: &Credential) -> Result<Vec<ChatSession>> {
        self.record(Call::List)?;
        self.history_guard()?;
        Ok(self.with_state(|s| {
            s.sessions
                .iter()
                .map(|d| ChatSession {
                    id: d.id,
                    title: d.title.clone(),
                    created_at: d.created_at,
                    updated_at: d.updated_at,
                    message_count: d.messages.len(),
                    last_message_preview: d
                        .messages
                        .iter()
                        .rev()
                        .find(|m| m.role == Role::User)
                        .map(|m| preview_of(&m.content, 100)),
                })
                .collect()
        }))
    }

    async fn get_session(&self, _credential: &Credential, id: SessionId) -> Result<SessionDetail> {
        self.record(Call::Get(id))?;
        let gate = self.with_state(|s| s.get_gates.pop_front());
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.history_guard()?;
        self.with_state(|s| s.sessions.iter().find(|d| d.id == id).cloned())
            .ok_or_else(|| {
                KbchatError::Status {
                    status: 404,
                    message: format!("GET /history/sessions/{id}"),
                }
                .into()
            })
    }

    async fn delete_session(&self, _credential: &Credential, id: SessionId) -> Result<()> {
        self.record(Call::Delete(id))?;
        self.history_guard()?;
        self.with_state(|s| {
            let before = s.sessions.len();
            s.sessions.retain(|d| d.id != id);
            if s.sessions.len() == before {
                Err(KbchatError::Status {
                    status: 404,
                    message: format!("DELETE /history/sessions/{id}"),
                }
                .into())
            } else {
                Ok(())
            }
        })
    }

    async fn rename_session(
        &self,
        _credential: &Credential,
        id: SessionId,
        title: &str,
    ) -> Result<()> {
        self.record(Call::Rename(id, title.to_string()))?;
        self.history_guard()?;
        self.with_state(|s| match s.sessions.iter_mut().find(|d| d.id == id) {
            Some(detail) => {
                detail.title = title.to_string();
                Ok(())
            }
            None => Err(KbchatError::Status {
                status: 404,
                message: format!("PUT /history/sessions/{id}/title"),
            }
            .into()),
        })
    }
}

fn profile_for(id: i64, email: &str) -> UserProfile {
    UserProfile {
        id,
        email: email.to_string(),
        username: email.split('@').next().unwrap_or(email).to_string(),
        full_name: None,
        is_active: true,
    }
}

#[async_trait]
impl AuthApi for ScriptedBackend {
    async fn register(&self, registration: &Registration) -> Result<UserProfile> {
        self.record(Call::Register(registration.email.clone()))?;
        Ok(UserProfile {
            username: registration.username.clone(),
            full_name: registration.full_name.clone(),
            ..profile_for(1, &registration.email)
        })
    }

    async fn login(&self, email: &str, _password: &str) -> Result<Credential> {
        self.record(Call::Login(email.to_string()))?;
        Ok(Credential::bearer(format!("token-for-{email}")))
    }

    async fn verify_token(&self, _credential: &Credential) -> Result<()> {
        self.record(Call::Verify)
    }

    async fn me(&self, credential: &Credential) -> Result<UserProfile> {
        self.record(Call::Me)?;
        let email = credential
            .access_token
            .strip_prefix("token-for-")
            .unwrap_or("someone@example.com");
        Ok(profile_for(1, email))
    }
}
