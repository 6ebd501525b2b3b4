//! Ideascope - chat-driven GSoC idea search
//!
#![doc = "Ideascope - chat-driven search over a catalog of GSoC program ideas"]
#![doc = "Main entry point for the Ideascope application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ideascope::cli::{Cli, Commands};
use ideascope::commands;
use ideascope::config::{Config, HISTORY_DB_ENV};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // If the user supplied a storage path on the CLI, mirror it into the
    // environment so `ChatStore::new()` honors the override without every
    // caller threading it through.
    if let Some(db_path) = &cli.storage_path {
        std::env::set_var(HISTORY_DB_ENV, db_path);
        tracing::info!("Using storage DB override from CLI: {}", db_path);
    }

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat {
            mode,
            count,
            resume,
        } => {
            tracing::info!("Starting interactive chat mode");
            if let Some(m) = &mode {
                tracing::debug!("Using query mode override: {}", m);
            }
            if let Some(n) = count {
                tracing::debug!("Using result count override: {}", n);
            }
            if let Some(r) = &resume {
                tracing::debug!("Resuming chat: {}", r);
            }

            commands::chat::run_chat(config, mode, count, resume).await?;
            Ok(())
        }
        Commands::History { command } => {
            commands::history::handle_history(&config, command)?;
            Ok(())
        }
        Commands::Serve { addr } => {
            tracing::info!("Starting assistant API service");
            commands::serve::run_serve(config, &addr).await?;
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "ideascope=debug"
    } else {
        "ideascope=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
