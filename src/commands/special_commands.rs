//! Special commands parser for interactive chat mode
//!
//! Special commands manage sessions from inside the chat loop instead of
//! being sent as questions. They are prefixed with `/` and the command word
//! is case-insensitive.

use crate::store::SessionId;
use colored::Colorize;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a new, unsaved conversation
    NewSession,

    /// List stored sessions
    ListSessions,

    /// Make a stored session the active conversation
    LoadSession(SessionId),

    /// Rename a stored session
    RenameSession { id: SessionId, title: String },

    /// Delete a stored session
    DeleteSession(SessionId),

    /// Show help
    Help,

    /// Leave the chat
    Exit,

    /// Not a special command; send the input as a question
    None,
}

/// Parse user input into a special command
///
/// Input that does not start with `/` (other than the bare words `exit` and
/// `quit`) is a question and yields [`SpecialCommand::None`].
///
/// # Errors
///
/// Returns [`CommandError`] for an unknown `/command`, a missing argument,
/// or a session id that is not a number.
///
/// # Examples
///
/// ```
/// use kbchat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/load 7"), Ok(SpecialCommand::LoadSession(7)));
/// assert_eq!(parse_special_command("What is BM25?"), Ok(SpecialCommand::None));
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();

    match trimmed.to_lowercase().as_str() {
        "exit" | "quit" => return Ok(SpecialCommand::Exit),
        _ => {}
    }

    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (cmd, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
        None => (trimmed.to_lowercase(), ""),
    };

    match cmd.as_str() {
        "/new" => Ok(SpecialCommand::NewSession),
        "/sessions" | "/history" => Ok(SpecialCommand::ListSessions),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/quit" | "/exit" => Ok(SpecialCommand::Exit),
        "/load" => parse_id(&cmd, rest, "/load <id>").map(SpecialCommand::LoadSession),
        "/delete" => parse_id(&cmd, rest, "/delete <id>").map(SpecialCommand::DeleteSession),
        "/rename" => {
            let usage = "/rename <id> <title>";
            let (id, title) = match rest.split_once(char::is_whitespace) {
                Some((id, title)) => (id, title.trim()),
                None => (rest, ""),
            };
            let id = parse_id(&cmd, id, usage)?;
            if title.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: cmd,
                    usage: usage.to_string(),
                });
            }
            Ok(SpecialCommand::RenameSession {
                id,
                title: title.to_string(),
            })
        }
        _ => Err(CommandError::UnknownCommand(cmd)),
    }
}

fn parse_id(command: &str, arg: &str, usage: &str) -> Result<SessionId, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingArgument {
            command: command.to_string(),
            usage: usage.to_string(),
        });
    }
    arg.parse()
        .map_err(|_| CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        })
}

/// Print help for the chat loop
pub fn print_help() {
    println!();
    println!("{}", "Chat commands".bold());
    println!("  {}                 start a new conversation", "/new".cyan());
    println!("  {}            list stored sessions", "/sessions".cyan());
    println!("  {}           load a stored session", "/load <id>".cyan());
    println!(
        "  {}  rename a stored session",
        "/rename <id> <title>".cyan()
    );
    println!("  {}         delete a stored session", "/delete <id>".cyan());
    println!("  {}                show this help", "/help".cyan());
    println!("  {}                leave the chat", "/quit".cyan());
    println!();
    println!("Anything else is sent as a question.");
    println!();
}
