//! `reqwest` implementation of the remote service contract
//!
//! Every call maps its outcome onto [`KbchatError`]:
//!
//! - connection failures and timeouts -> [`KbchatError::Transport`]
//! - `401 Unauthorized` -> [`KbchatError::Unauthorized`]
//! - any other non-2xx status -> [`KbchatError::Status`]
//! - a body that does not match the expected shape -> [`KbchatError::Decode`]
//!
//! Raw response bodies are never included in errors; only the endpoint and
//! status are, so nothing from the service leaks to the end user.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::types::{LoginRequest, TitleUpdate, TokenResponse};
use crate::api::{
    AskRequest, AskResponse, AuthApi, ChatBackend, Registration, SessionDetail, StatelessAnswer,
    StatelessAskRequest, UserProfile,
};
use crate::auth::Credential;
use crate::config::BackendConfig;
use crate::error::{KbchatError, Result};
use crate::store::{ChatSession, SessionId};

/// HTTP client for the answering service
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use url::Url;
/// use kbchat::api::HttpBackend;
///
/// let backend = HttpBackend::new(
///     Url::parse("http://localhost:8000").unwrap(),
///     Url::parse("http://localhost:3000/api/chat").unwrap(),
///     Duration::from_secs(30),
/// )
/// .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: Url,
    proxy_url: Url,
}

impl HttpBackend {
    /// Builds a backend rooted at `base_url`
    ///
    /// `proxy_url` is the full URL of the stateless chat endpoint. The
    /// `timeout` applies to each individual request.
    ///
    /// # Errors
    ///
    /// Returns [`KbchatError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: Url, proxy_url: Url, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(KbchatError::Http)?;
        Ok(Self {
            http_client,
            base_url,
            proxy_url,
        })
    }

    /// Builds a backend from the `backend` configuration section
    ///
    /// # Errors
    ///
    /// Returns [`KbchatError::Config`] if either URL does not parse.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| KbchatError::Config(format!("invalid backend.base_url: {e}")))?;
        let proxy_url = Url::parse(&config.proxy_url)
            .map_err(|e| KbchatError::Config(format!("invalid backend.proxy_url: {e}")))?;
        Self::new(
            base_url,
            proxy_url,
            Duration::from_secs(config.timeout_seconds),
        )
    }

    /// Base URL of the authenticated endpoints
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)
            .map_err(|e| KbchatError::Config(format!("invalid endpoint {joined}: {e}")))?)
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| KbchatError::Transport(format!("{what}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(KbchatError::Unauthorized(what.to_string()).into());
        }
        if !status.is_success() {
            return Err(KbchatError::Status {
                status: status.as_u16(),
                message: what.to_string(),
            }
            .into());
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let body = response
            .text()
            .await
            .map_err(|e| KbchatError::Transport(format!("{what}: reading body: {e}")))?;
        Ok(serde_json::from_str(&body).map_err(|e| KbchatError::Decode(format!("{what}: {e}")))?)
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn ask(&self, credential: &Credential, request: &AskRequest) -> Result<AskResponse> {
        let what = "POST /chat-history";
        let req = self
            .http_client
            .post(self.endpoint("chat-history")?)
            .header("Authorization", credential.authorization_header())
            .json(request);
        let response = self.execute(req, what).await?;
        Self::decode(response, what).await
    }

    async fn ask_stateless(&self, request: &StatelessAskRequest) -> Result<StatelessAnswer> {
        let what = "POST /api/chat";
        let req = self
            .http_client
            .post(self.proxy_url.clone())
            .header("Accept", "application/json")
            .json(request);
        let response = self.execute(req, what).await?;
        Self::decode(response, what).await
    }

    async fn list_sessions(&self, credential: &Credential) -> Result<Vec<ChatSession>> {
        let what = "GET /history/sessions";
        let req = self
            .http_client
            .get(self.endpoint("history/sessions")?)
            .header("Authorization", credential.authorization_header());
        let response = self.execute(req, what).await?;
        Self::decode(response, what).await
    }

    async fn get_session(&self, credential: &Credential, id: SessionId) -> Result<SessionDetail> {
        let what = format!("GET /history/sessions/{id}");
        let req = self
            .http_client
            .get(self.endpoint(&format!("history/sessions/{id}"))?)
            .header("Authorization", credential.authorization_header());
        let response = self.execute(req, &what).await?;
        Self::decode(response, &what).await
    }

    async fn delete_session(&self, credential: &Credential, id: SessionId) -> Result<()> {
        let what = format!("DELETE /history/sessions/{id}");
        let req = self
            .http_client
            .delete(self.endpoint(&format!("history/sessions/{id}"))?)
            .header("Authorization", credential.authorization_header());
        self.execute(req, &what).await?;
        Ok(())
    }

    async fn rename_session(
        &self,
        credential: &Credential,
        id: SessionId,
        title: &str,
    ) -> Result<()> {
        let what = format!("PUT /history/sessions/{id}/title");
        let req = self
            .http_client
            .put(self.endpoint(&format!("history/sessions/{id}/title"))?)
            .header("Authorization", credential.authorization_header())
            .json(&TitleUpdate {
                title: title.to_string(),
            });
        self.execute(req, &what).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthApi for HttpBackend {
    async fn register(&self, registration: &Registration) -> Result<UserProfile> {
        let what = "POST /auth/register";
        let req = self
            .http_client
            .post(self.endpoint("auth/register")?)
            .json(registration);
        let response = self.execute(req, what).await?;
        Self::decode(response, what).await
    }

    async fn login(&self, email: &str, password: &str) -> Result<Credential> {
        let what = "POST /auth/login";
        let req = self
            .http_client
            .post(self.endpoint("auth/login")?)
            .json(&LoginRequest { email, password });
        let response = self.execute(req, what).await?;
        let token: TokenResponse = Self::decode(response, what).await?;
        Ok(Credential {
            access_token: token.access_token,
            token_type: token.token_type,
        })
    }

    async fn verify_token(&self, credential: &Credential) -> Result<()> {
        let what = "POST /auth/verify-token";
        let req = self
            .http_client
            .post(self.endpoint("auth/verify-token")?)
            .header("Authorization", credential.authorization_header());
        self.execute(req, what).await?;
        Ok(())
    }

    async fn me(&self, credential: &Credential) -> Result<UserProfile> {
        let what = "GET /auth/me";
        let req = self
            .http_client
            .get(self.endpoint("auth/me")?)
            .header("Authorization", credential.authorization_header());
        let response = self.execute(req, what).await?;
        Self::decode(response, what).await
    }
}
