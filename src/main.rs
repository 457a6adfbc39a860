//! KBChat - knowledge-base chat client
//!
#![doc = "KBChat - knowledge-base chat client"]
#![doc = "Main entry point for the kbchat command line application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kbchat::cli::{Cli, Commands};
use kbchat::commands;
use kbchat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { stateless, session } => {
            tracing::info!("Starting interactive chat mode");
            if let Some(id) = session {
                tracing::debug!("Resuming session: {}", id);
            }
            commands::chat::run_chat(config, stateless, session).await?;
            Ok(())
        }
        Commands::Sessions { command } => {
            tracing::info!("Starting session command");
            commands::sessions::handle_sessions(config, command).await?;
            Ok(())
        }
        Commands::Register {
            email,
            username,
            full_name,
        } => {
            tracing::info!("Registering account");
            commands::auth::register(config, email, username, full_name).await?;
            Ok(())
        }
        Commands::Login { email } => {
            tracing::info!("Logging in");
            commands::auth::login(config, email).await?;
            Ok(())
        }
        Commands::Logout => {
            commands::auth::logout(config)?;
            Ok(())
        }
        Commands::Whoami => {
            commands::auth::whoami(config).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so they never interleave with chat output.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "kbchat=debug" } else { "kbchat=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
