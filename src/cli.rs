//! Command-line interface definition for KBChat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, session management, and
//! authentication.

use clap::{Parser, Subcommand};

/// KBChat - chat client for a knowledge-base answering service
///
/// Ask questions in persistent sessions (or statelessly) and manage the
/// stored conversation history.
#[derive(Parser, Debug, Clone)]
#[command(name = "kbchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "KBCHAT_CONFIG", default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Override the service base URL
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for KBChat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat
    Chat {
        /// Use the stateless endpoint (no login, nothing persisted)
        #[arg(long)]
        stateless: bool,

        /// Resume a stored session by id
        #[arg(short, long)]
        session: Option<i64>,
    },

    /// Manage stored sessions
    Sessions {
        /// Session management subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Create an account, then log in with it
    Register {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Public user name (at least 3 characters)
        #[arg(short, long)]
        username: String,

        /// Optional display name
        #[arg(long)]
        full_name: Option<String>,
    },

    /// Log in and store the credential
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,
    },

    /// Forget the stored credential
    Logout,

    /// Show who the stored credential belongs to
    Whoami,
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List stored sessions
    List,

    /// Print the messages of a session
    Show {
        /// Session id
        id: i64,
    },

    /// Delete a session
    Delete {
        /// Session id
        id: i64,
    },

    /// Rename a session
    Rename {
        /// Session id
        id: i64,

        /// New title
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
