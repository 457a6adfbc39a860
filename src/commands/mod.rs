/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`     - Interactive chat loop
- `sessions` - One-shot session management
- `auth`     - Registration, login, logout and profile

The handlers are thin: they build an `AuthGateway` and a `ChatClient` from
the configuration and render the resulting state.
*/

use crate::auth::{AuthGateway, CredentialStore, KeyringCredentialStore, MemoryCredentialStore};
use crate::config::{Config, CredentialStoreKind};
use crate::error::{KbchatError, Result};
use std::sync::Arc;

// Special commands parser for the chat loop
pub mod special_commands;

// Session management commands
pub mod sessions;

/// Builds the auth gateway for `config` and loads the stored credential
///
/// # Errors
///
/// Returns an error if the credential store cannot be read.
pub fn build_gateway(config: &Config) -> Result<AuthGateway> {
    let store: Arc<dyn CredentialStore> = match config.auth.credential_store {
        CredentialStoreKind::Keyring => {
            Arc::new(KeyringCredentialStore::new(config.auth.account.clone()))
        }
        CredentialStoreKind::Memory => Arc::new(MemoryCredentialStore::new()),
    };
    let gateway = AuthGateway::new(store);
    gateway.load()?;
    Ok(gateway)
}

/// Fails with a login hint when no credential is held
pub fn require_login(auth: &AuthGateway) -> Result<()> {
    if auth.is_authenticated() {
        Ok(())
    } else {
        Err(KbchatError::MissingCredentials(
            "not logged in; run `kbchat login --email <address>`".to_string(),
        )
        .into())
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Builds a `ChatClient` and runs a readline-based loop: special
    //! commands manage sessions, anything else is sent as a question and the
    //! settled answer is printed.

    use super::sessions::{print_message, sessions_table};
    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::*;
    use crate::api::HttpBackend;
    use crate::client::ChatClient;
    use crate::config::ChatMode;
    use crate::coordinator::SendOutcome;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `stateless` - Use the stateless endpoint instead of sessions
    /// * `session` - Stored session to resume
    ///
    /// Each question is awaited before the next line is read, so sends never
    /// overlap here and `chat.submit_policy` has no visible effect.
    pub async fn run_chat(mut config: Config, stateless: bool, session: Option<i64>) -> Result<()> {
        if stateless {
            config.chat.mode = ChatMode::Stateless;
        }
        let persistent = config.chat.mode == ChatMode::Persistent;

        let backend = Arc::new(HttpBackend::from_config(&config.backend)?);
        let auth = build_gateway(&config)?;

        if persistent {
            require_login(&auth)?;
            if config.auth.verify_on_startup && !auth.verify(backend.as_ref()).await {
                require_login(&auth)?;
                println!(
                    "{}",
                    "Could not verify the stored credential; continuing anyway.".yellow()
                );
            }
            auth.on_rejected(|| {
                eprintln!(
                    "{}",
                    "Your session has expired. Run `kbchat login` to sign in again.".red()
                );
            });
        }

        let client = ChatClient::new(backend, auth.clone(), config.chat.clone());

        if persistent {
            client.history().list_sessions().await;
            if let Some(id) = session {
                if client.history().load_session(id).await {
                    for message in &client.snapshot().messages {
                        print_message(message);
                    }
                } else {
                    println!("{}", format!("Could not load session {}", id).yellow());
                }
            }
        }

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&config);

        loop {
            let prompt = format!("{} ", "you>".green().bold());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            println!("{}", e.to_string().red());
                            continue;
                        }
                    };

                    if !matches!(
                        command,
                        SpecialCommand::None | SpecialCommand::Help | SpecialCommand::Exit
                    ) && !persistent
                    {
                        println!(
                            "{}",
                            "Session commands are not available in stateless mode.".yellow()
                        );
                        continue;
                    }

                    match command {
                        SpecialCommand::NewSession => {
                            client.history().create_new_session();
                            println!("{}", "Started a new conversation.".green());
                            continue;
                        }
                        SpecialCommand::ListSessions => {
                            let sessions = client.history().list_sessions().await;
                            if sessions.is_empty() {
                                println!("{}", "No sessions found.".yellow());
                            } else {
                                sessions_table(&sessions).printstd();
                            }
                            continue;
                        }
                        SpecialCommand::LoadSession(id) => {
                            if client.history().load_session(id).await {
                                for message in &client.snapshot().messages {
                                    print_message(message);
                                }
                            } else {
                                println!("{}", format!("Could not load session {}", id).red());
                            }
                            continue;
                        }
                        SpecialCommand::RenameSession { id, title } => {
                            if client.history().rename_session(id, &title).await {
                                println!("{}", format!("Renamed session {}", id).green());
                            } else {
                                println!("{}", format!("Could not rename session {}", id).red());
                            }
                            continue;
                        }
                        SpecialCommand::DeleteSession(id) => {
                            if client.history().delete_session(id).await {
                                println!("{}", format!("Deleted session {}", id).green());
                            } else {
                                println!("{}", format!("Could not delete session {}", id).red());
                            }
                            continue;
                        }
                        SpecialCommand::Help => {
                            print_help();
                            continue;
                        }
                        SpecialCommand::Exit => break,
                        SpecialCommand::None => {}
                    }

                    rl.add_history_entry(trimmed)?;
                    println!("{}", config.chat.thinking_text.dimmed());

                    match client.send(trimmed).await {
                        SendOutcome::Answered | SendOutcome::Failed => {
                            if let Some(answer) = client.snapshot().messages.last() {
                                print_message(answer);
                            }
                        }
                        SendOutcome::Ignored if persistent && !auth.is_authenticated() => {
                            println!(
                                "{}",
                                "Not logged in. Run `kbchat login` and restart the chat.".red()
                            );
                            break;
                        }
                        SendOutcome::Ignored | SendOutcome::Discarded => {}
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        Ok(())
    }

    fn print_welcome_banner(config: &Config) {
        println!();
        println!("{}", "KBChat".bold());
        let mode = match config.chat.mode {
            ChatMode::Persistent => "persistent sessions".cyan(),
            ChatMode::Stateless => "stateless (nothing is saved)".yellow(),
        };
        println!("Mode:    {}", mode);
        println!("Service: {}", config.backend.base_url);
        println!("Type '/help' for available commands, '/quit' to leave\n");
    }
}

// Authentication commands
pub mod auth {
    //! Registration, login, logout and profile.

    use super::*;
    use crate::api::{HttpBackend, Registration};
    use colored::Colorize;
    use rustyline::config::Configurer;
    use rustyline::highlight::Highlighter;
    use rustyline::history::DefaultHistory;
    use rustyline::{ColorMode, Completer, Editor, Helper, Hinter, Validator};
    use std::borrow::Cow;

    /// Environment variable read for the password before prompting
    pub const PASSWORD_ENV: &str = "KBCHAT_PASSWORD";

    /// Renders every typed character as `*`
    #[derive(Completer, Helper, Hinter, Validator)]
    struct PasswordMask;

    impl Highlighter for PasswordMask {
        fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
            Cow::Owned("*".repeat(line.chars().count()))
        }

        fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
            true
        }
    }

    /// Reads a password without echoing it and without recording history
    fn prompt_password(prompt: &str) -> Result<String> {
        let mut rl: Editor<PasswordMask, DefaultHistory> = Editor::new()?;
        rl.set_helper(Some(PasswordMask));
        rl.set_color_mode(ColorMode::Forced);
        rl.set_auto_add_history(false);
        let mut cursor = rl.set_cursor_visibility(false)?;
        let password = rl.readline(prompt)?;
        cursor.take();
        Ok(password)
    }

    /// `KBCHAT_PASSWORD` when set, otherwise a masked terminal prompt
    fn read_password() -> Result<String> {
        match std::env::var(PASSWORD_ENV) {
            Ok(password) => Ok(password),
            Err(_) => prompt_password("password: "),
        }
    }

    /// Create an account and log in with it
    pub async fn register(
        config: Config,
        email: String,
        username: String,
        full_name: Option<String>,
    ) -> Result<()> {
        let password = read_password()?;
        let registration = Registration {
            email,
            username,
            password,
            full_name,
        };

        let backend = HttpBackend::from_config(&config.backend)?;
        let auth = build_gateway(&config)?;
        let profile = auth.register(&backend, &registration).await?;

        println!(
            "{}",
            format!("Registered {} and logged in as {}", profile.username, profile.email).green()
        );
        Ok(())
    }

    /// Log in as `email` and store the credential
    ///
    /// The password comes from `KBCHAT_PASSWORD` when set, otherwise from a
    /// masked terminal prompt.
    pub async fn login(config: Config, email: String) -> Result<()> {
        let password = read_password()?;

        let backend = HttpBackend::from_config(&config.backend)?;
        let auth = build_gateway(&config)?;
        auth.login(&backend, &email, &password).await?;

        println!("{}", format!("Logged in as {}", email.trim()).green());
        Ok(())
    }

    /// Forget the stored credential
    pub fn logout(config: Config) -> Result<()> {
        let auth = build_gateway(&config)?;
        auth.logout();
        println!("{}", "Logged out.".green());
        Ok(())
    }

    /// Report who the stored credential belongs to
    pub async fn whoami(config: Config) -> Result<()> {
        let auth = build_gateway(&config)?;
        if !auth.is_authenticated() {
            println!("{}", "Not logged in.".yellow());
            return Ok(());
        }

        let backend = HttpBackend::from_config(&config.backend)?;
        match auth.profile(&backend).await {
            Ok(Some(profile)) => {
                let name = match &profile.full_name {
                    Some(full_name) => format!("{} ({})", full_name, profile.username),
                    None => profile.username.clone(),
                };
                println!(
                    "{}",
                    format!(
                        "Logged in to {} as {} <{}>",
                        config.backend.base_url, name, profile.email
                    )
                    .green()
                );
            }
            Ok(None) => println!("{}", "Not logged in.".yellow()),
            Err(e) if auth.is_authenticated() => {
                tracing::warn!("failed to fetch profile: {e:#}");
                println!(
                    "{}",
                    "A credential is stored but could not be verified right now.".yellow()
                );
            }
            Err(_) => {
                println!(
                    "{}",
                    "The stored credential was rejected and has been removed.".red()
                );
            }
        }
        Ok(())
    }

}
