use crate::cli::SessionCommand;
use crate::client::ChatClient;
use crate::config::Config;
use crate::error::{KbchatError, Result};
use crate::store::{ChatMessage, ChatSession, Role};
use colored::Colorize;
use prettytable::{format, Table};

const TITLE_WIDTH: usize = 40;

/// Handle `kbchat sessions ...`
pub async fn handle_sessions(config: Config, command: SessionCommand) -> Result<()> {
    let auth = super::build_gateway(&config)?;
    super::require_login(&auth)?;
    let client = ChatClient::from_config(&config, auth)?;
    let history = client.history();

    match command {
        SessionCommand::List => {
            let sessions = history.list_sessions().await;
            if sessions.is_empty() {
                println!("{}", "No sessions found.".yellow());
                return Ok(());
            }

            println!("\nSessions:");
            sessions_table(&sessions).printstd();
            println!();
            println!(
                "Use {} to continue a session.",
                "kbchat chat --session <ID>".cyan()
            );
            println!();
        }
        SessionCommand::Show { id } => {
            if !history.load_session(id).await {
                return Err(session_error("load", id));
            }
            let snapshot = client.snapshot();
            for message in &snapshot.messages {
                print_message(message);
            }
        }
        SessionCommand::Delete { id } => {
            if !history.delete_session(id).await {
                return Err(session_error("delete", id));
            }
            println!("{}", format!("Deleted session {}", id).green());
        }
        SessionCommand::Rename { id, title } => {
            let title = title.join(" ");
            // The local entry must exist for the rename to be reconciled.
            history.list_sessions().await;
            if !history.rename_session(id, &title).await {
                return Err(session_error("rename", id));
            }
            println!("{}", format!("Renamed session {} to \"{}\"", id, title).green());
        }
    }

    Ok(())
}

fn session_error(action: &str, id: i64) -> anyhow::Error {
    KbchatError::Session(format!(
        "Could not {} session {} (run with --verbose for details)",
        action, id
    ))
    .into()
}

/// Builds the session listing table
pub fn sessions_table(sessions: &[ChatSession]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Last Question".bold(),
        "Last Updated".bold()
    ]);

    for session in sessions {
        let title = truncate(&session.title, TITLE_WIDTH);
        let preview = session
            .last_message_preview
            .as_deref()
            .map(|p| truncate(p, TITLE_WIDTH))
            .unwrap_or_else(|| "-".to_string());
        let updated = session.updated_at.format("%Y-%m-%d %H:%M").to_string();

        table.add_row(prettytable::row![
            session.id.to_string().cyan(),
            title,
            session.message_count,
            preview,
            updated
        ]);
    }

    table
}

/// Prints one message of a conversation with its media references
pub fn print_message(message: &ChatMessage) {
    match message.role {
        Role::User => println!("{} {}", "you>".green().bold(), message.content),
        Role::Assistant => println!("{} {}", "kb>".blue().bold(), message.content),
    }
    for image in message.images.iter().flatten() {
        println!("     {} {}", "image:".dimmed(), image);
    }
    for video in message.videos.iter().flatten() {
        println!("     {} {}", "video:".dimmed(), video);
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
