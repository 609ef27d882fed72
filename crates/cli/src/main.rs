//! Switchboard CLI: the main entry point.
//!
//! Commands:
//! - `init`          Write a default config
//! - `chat`          Interactive or single-message mode
//! - `capabilities`  Connect every configured server and list the namespace
//! - `serve`         Run a built-in capability server on stdio

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "switchboard",
    about = "Switchboard: a capability-routed reasoning loop",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.switchboard/config.toml
    #[arg(short, long, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Chat through the reasoning loop
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List every capability the configured servers advertise
    Capabilities {
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve a built-in capability set over stdin/stdout
    Serve {
        /// Which built-in set
        #[arg(default_value = "utils")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // stdout carries the protocol under `serve`, so logs go to stderr
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config, force).await?,
        Commands::Chat { message } => commands::chat::run(config, message).await?,
        Commands::Capabilities { json } => commands::capabilities::run(config, json).await?,
        Commands::Serve { name } => commands::serve::run(&name).await?,
    }

    Ok(())
}
