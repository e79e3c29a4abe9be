//! Quarry CLI entry point.

use anyhow::Result;
use clap::Parser;
use quarry::cli::{commands, Cli, Commands};
use quarry::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("quarry={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;

    let user = cli.user.as_str();

    match &cli.command {
        Commands::Import { what } => {
            commands::run_import(what, settings).await?;
        }

        Commands::Sources { action } => {
            commands::run_sources(action, settings).await?;
        }

        Commands::Ask {
            question,
            conversation,
        } => {
            commands::run_ask(question, *conversation, user, settings).await?;
        }

        Commands::Chat { conversation } => {
            commands::run_chat(*conversation, user, settings).await?;
        }

        Commands::Conversations { action } => {
            commands::run_conversations(action, user, settings).await?;
        }

        Commands::Prefs { action } => {
            commands::run_prefs(action, user, settings).await?;
        }

        Commands::Index { action } => {
            commands::run_index(action, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host.clone(), *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings)?;
        }
    }

    Ok(())
}
