//! Remote service abstraction
//!
//! The [`ChatBackend`] trait is the contract the request coordinator and the
//! history client consume; [`AuthApi`] covers the account endpoints used by
//! the auth gateway. [`http::HttpBackend`] implements both over `reqwest`.
//!
//! Implementations report an HTTP 401 as
//! [`KbchatError::Unauthorized`](crate::error::KbchatError::Unauthorized) so
//! that callers can route it to the auth gateway's rejection callback.
//! Credentials are passed explicitly on every authenticated call.

use async_trait::async_trait;

use crate::auth::Credential;
use crate::error::Result;
use crate::store::{ChatSession, SessionId};

pub mod http;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use http::HttpBackend;
pub use types::{
    AskRequest, AskResponse, Registration, SessionDetail, StatelessAnswer, StatelessAskRequest,
    UserProfile,
};

/// Answering and history endpoints of the remote service
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `POST /chat-history`: answer a question and persist the exchange
    async fn ask(&self, credential: &Credential, request: &AskRequest) -> Result<AskResponse>;

    /// `POST /api/chat`: answer a question without persistence
    async fn ask_stateless(&self, request: &StatelessAskRequest) -> Result<StatelessAnswer>;

    /// `GET /history/sessions`
    async fn list_sessions(&self, credential: &Credential) -> Result<Vec<ChatSession>>;

    /// `GET /history/sessions/{id}`
    async fn get_session(&self, credential: &Credential, id: SessionId) -> Result<SessionDetail>;

    /// `DELETE /history/sessions/{id}`
    async fn delete_session(&self, credential: &Credential, id: SessionId) -> Result<()>;

    /// `PUT /history/sessions/{id}/title`
    async fn rename_session(&self, credential: &Credential, id: SessionId, title: &str)
        -> Result<()>;
}

/// Account endpoints of the remote service
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/register`: create an account; does not log in
    async fn register(&self, registration: &Registration) -> Result<UserProfile>;

    /// `POST /auth/login`
    async fn login(&self, email: &str, password: &str) -> Result<Credential>;

    /// `POST /auth/verify-token`
    async fn verify_token(&self, credential: &Credential) -> Result<()>;

    /// `GET /auth/me`: profile of the credential's owner
    async fn me(&self, credential: &Credential) -> Result<UserProfile>;
}
