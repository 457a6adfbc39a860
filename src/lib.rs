//! KBChat - chat client library for a knowledge-base answering service
//!
//! This library provides the client-side controller behind the `kbchat`
//! binary: it keeps the session list and the active conversation, issues
//! questions to the remote answering service, and reconciles the answers
//! with local state when requests overlap, fail, or are rejected.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `store`: Session list and active conversation state
//! - `coordinator`: One logical send, including cancellation of stale sends
//! - `history`: Session list, load, new, delete and rename
//! - `auth`: Credential ownership and the rejection callback
//! - `api`: Remote service contract and its HTTP implementation
//! - `client`: Wiring of the above over one shared state
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use kbchat::{ChatClient, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let auth = kbchat::commands::build_gateway(&config)?;
//!     let client = ChatClient::from_config(&config, auth)?;
//!     client.send("How are documents chunked?").await;
//!     println!("{:?}", client.snapshot().messages.last());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod store;

// Re-export commonly used types
pub use auth::{AuthGateway, Credential};
pub use client::ChatClient;
pub use config::{ChatMode, Config, SubmitPolicy};
pub use coordinator::{RequestCoordinator, SendOutcome};
pub use error::{KbchatError, Result};
pub use history::HistoryClient;
pub use store::{ChatMessage, ChatSession, ConversationSnapshot, SessionStore};
