//! Auth gateway: owner of the bearer credential
//!
//! [`AuthGateway`] is the single component responsible for the credential
//! lifecycle: it is loaded from a [`CredentialStore`] at startup, replaced on
//! login (or registration, which logs in right after), and cleared on logout
//! or when the service rejects it. Every
//! authenticated call receives the credential explicitly from
//! [`AuthGateway::credential`]; nothing reads it from ambient state.
//!
//! When a call comes back unauthenticated, [`AuthGateway::reject`] is the one
//! callback that runs: it forgets the credential (in memory and in the
//! store) and notifies the optional rejection listener, so the presentation
//! layer can prompt for a new login. No call is ever retried automatically.

use std::sync::{Arc, RwLock};

use crate::api::{AuthApi, Registration, UserProfile};
use crate::error::{KbchatError, Result};

pub mod credential_store;

pub use credential_store::{
    Credential, CredentialStore, KeyringCredentialStore, MemoryCredentialStore,
};

const MIN_USERNAME_CHARS: usize = 3;
const MIN_PASSWORD_CHARS: usize = 8;

type RejectionListener = Arc<dyn Fn() + Send + Sync>;

struct GatewayInner {
    credential: RwLock<Option<Credential>>,
    store: Arc<dyn CredentialStore>,
    on_rejected: RwLock<Option<RejectionListener>>,
}

/// Supplies credentials to outbound calls and reacts to rejection
///
/// Cloning is cheap; clones share the same credential.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use kbchat::auth::{AuthGateway, Credential, MemoryCredentialStore};
///
/// let store = Arc::new(MemoryCredentialStore::with_credential(Credential::bearer("t")));
/// let gateway = AuthGateway::new(store);
/// assert!(gateway.load().unwrap());
/// assert!(gateway.is_authenticated());
///
/// gateway.reject();
/// assert!(gateway.credential().is_none());
/// ```
#[derive(Clone)]
pub struct AuthGateway {
    inner: Arc<GatewayInner>,
}

impl AuthGateway {
    /// Creates a gateway with no credential loaded yet
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                credential: RwLock::new(None),
                store,
                on_rejected: RwLock::new(None),
            }),
        }
    }

    /// Creates a gateway holding `credential`, backed by a memory store
    pub fn with_credential(credential: Credential) -> Self {
        let gateway = Self::new(Arc::new(MemoryCredentialStore::with_credential(
            credential.clone(),
        )));
        gateway.set(Some(credential));
        gateway
    }

    /// Loads the stored credential, returning whether one was found
    ///
    /// # Errors
    ///
    /// Returns an error if the credential store cannot be read.
    pub fn load(&self) -> Result<bool> {
        let loaded = self.inner.store.load()?;
        let found = loaded.is_some();
        self.set(loaded);
        tracing::debug!(found, "loaded stored credential");
        Ok(found)
    }

    /// The current credential, if any
    pub fn credential(&self) -> Option<Credential> {
        self.inner
            .credential
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Whether a credential is held
    pub fn is_authenticated(&self) -> bool {
        self.credential().is_some()
    }

    /// Stores `credential` in memory and in the credential store
    ///
    /// # Errors
    ///
    /// Returns an error if the credential store rejects the write; the
    /// in-memory credential is still updated.
    pub fn set_credential(&self, credential: Credential) -> Result<()> {
        self.set(Some(credential.clone()));
        self.inner.store.save(&credential)
    }

    /// Exchanges email and password for a credential and keeps it
    ///
    /// # Errors
    ///
    /// Returns [`KbchatError::Unauthorized`] on bad credentials, or the
    /// transport/storage error that prevented the login.
    pub async fn login(&self, api: &dyn AuthApi, email: &str, password: &str) -> Result<()> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(KbchatError::Validation("email and password are required".into()).into());
        }
        let credential = api.login(email.trim(), password).await?;
        self.set_credential(credential)?;
        tracing::info!("logged in");
        Ok(())
    }

    /// Creates an account, then logs in with the same email and password
    ///
    /// Input is checked locally first: the email must be non-blank, the
    /// username at least 3 characters and the password at least 8.
    ///
    /// # Errors
    ///
    /// Returns [`KbchatError::Validation`] for bad input without any network
    /// call, or the error of the register or login call.
    pub async fn register(
        &self,
        api: &dyn AuthApi,
        registration: &Registration,
    ) -> Result<UserProfile> {
        let registration = Registration {
            email: registration.email.trim().to_string(),
            username: registration.username.trim().to_string(),
            password: registration.password.clone(),
            full_name: registration
                .full_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        };
        if registration.email.is_empty() {
            return Err(KbchatError::Validation("email is required".into()).into());
        }
        if registration.username.chars().count() < MIN_USERNAME_CHARS {
            return Err(KbchatError::Validation(format!(
                "username must be at least {MIN_USERNAME_CHARS} characters"
            ))
            .into());
        }
        if registration.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(KbchatError::Validation(format!(
                "password must be at least {MIN_PASSWORD_CHARS} characters"
            ))
            .into());
        }

        let profile = api.register(&registration).await?;
        tracing::info!(user_id = profile.id, "account registered");
        self.login(api, &registration.email, &registration.password)
            .await?;
        Ok(profile)
    }

    /// Fetches the profile of the credential's owner
    ///
    /// Returns `Ok(None)` without a call when no credential is held. A
    /// rejected credential is cleared through [`reject`](Self::reject).
    ///
    /// # Errors
    ///
    /// Returns the error of the profile call.
    pub async fn profile(&self, api: &dyn AuthApi) -> Result<Option<UserProfile>> {
        let Some(credential) = self.credential() else {
            return Ok(None);
        };
        self.intercept(api.me(&credential).await).map(Some)
    }

    /// Checks the held credential against the service
    ///
    /// A rejected credential is cleared through [`reject`](Self::reject).
    /// Transport failures leave the credential in place and report `false`.
    pub async fn verify(&self, api: &dyn AuthApi) -> bool {
        let Some(credential) = self.credential() else {
            return false;
        };
        match self.intercept(api.verify_token(&credential).await) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("credential verification failed: {e:#}");
                false
            }
        }
    }

    /// Forgets the credential without notifying the rejection listener
    pub fn logout(&self) {
        self.forget();
        tracing::info!("logged out");
    }

    /// Registers the listener notified by [`reject`](Self::reject)
    pub fn on_rejected(&self, listener: impl Fn() + Send + Sync + 'static) {
        *self
            .inner
            .on_rejected
            .write()
            .unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(listener));
    }

    /// Rejection callback: the service refused the credential
    pub fn reject(&self) {
        tracing::warn!("credential rejected by the service; clearing it");
        self.forget();
        let listener = self
            .inner
            .on_rejected
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    /// Runs the rejection callback if `result` is an authentication failure
    ///
    /// The result is passed through unchanged so callers can keep using `?`
    /// or their own failure path.
    pub fn intercept<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if KbchatError::is_unauthorized(e) {
                self.reject();
            }
        }
        result
    }

    fn set(&self, credential: Option<Credential>) {
        *self
            .inner
            .credential
            .write()
            .unwrap_or_else(|p| p.into_inner()) = credential;
    }

    fn forget(&self) {
        self.set(None);
        if let Err(e) = self.inner.store.clear() {
            tracing::warn!("failed to clear stored credential: {e:#}");
        }
    }
}

impl std::fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGateway")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
