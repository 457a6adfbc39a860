//! Credential persistence
//!
//! The bearer credential survives restarts through a [`CredentialStore`].
//! [`KeyringCredentialStore`] keeps it in the operating system's native
//! credential store (Keychain on macOS, Secret Service on Linux, Windows
//! Credential Manager on Windows), serialized to JSON. The in-memory
//! [`MemoryCredentialStore`] backs tests and the `memory` configuration.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{KbchatError, Result};

/// A bearer credential issued by the answering service
///
/// The `Debug` implementation redacts the token so credentials never end up
/// in logs.
///
/// # Examples
///
/// ```
/// use kbchat::auth::Credential;
///
/// let cred = Credential::bearer("abc123");
/// assert_eq!(cred.authorization_header(), "Bearer abc123");
/// assert!(!format!("{:?}", cred).contains("abc123"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The access token string
    pub access_token: String,
    /// The token type, `bearer` for this service
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Credential {
    /// Creates a bearer credential
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
        }
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Somewhere to keep the credential between runs
pub trait CredentialStore: Send + Sync {
    /// Loads the stored credential, `None` when nothing is stored
    fn load(&self) -> Result<Option<Credential>>;

    /// Persists `credential`, replacing any previous one
    fn save(&self, credential: &Credential) -> Result<()>;

    /// Removes the stored credential; succeeds when nothing is stored
    fn clear(&self) -> Result<()>;
}

/// Keyring-backed store, one entry per account name
pub struct KeyringCredentialStore {
    account: String,
}

impl KeyringCredentialStore {
    /// Keyring service name shared by every account
    pub const SERVICE: &'static str = "kbchat";

    /// Creates a store for the given keyring account
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(Self::SERVICE, &self.account).map_err(KbchatError::Keyring)?)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        let json_str = match self.entry()?.get_password() {
            Ok(s) => s,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(KbchatError::Keyring(e).into()),
        };
        let credential: Credential = serde_json::from_str(&json_str)?;
        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let json_str = serde_json::to_string(credential)?;
        self.entry()?
            .set_password(&json_str)
            .map_err(KbchatError::Keyring)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KbchatError::Keyring(e).into()),
        }
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `credential`
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}
