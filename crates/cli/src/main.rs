//! AppForge CLI — the main entry point.
//!
//! Commands:
//! - `generate` — Build or change an app in a workspace directory
//! - `predict`  — Show the app type and components a request maps to
//! - `assemble` — Show the cache blocks the next turn would send
//! - `config`   — Show, validate or locate the configuration

use appforge_config::{AppConfig, LoggingConfig};
use appforge_context::AppType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "appforge",
    about = "AppForge — generate React apps with a cache-aware model loop",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate or modify an app from a request
    Generate {
        /// What to build
        request: String,

        /// Directory holding workspaces
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Workspace to edit, under the root directory
        #[arg(short, long, default_value = "app")]
        workspace: String,

        /// App type of an existing app, for follow-up requests
        #[arg(long)]
        app_type: Option<AppType>,
    },

    /// Predict the components a request needs
    Predict {
        request: String,

        #[arg(long)]
        app_type: Option<AppType>,
    },

    /// Print the context report for a request against a workspace
    Assemble {
        request: String,

        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        #[arg(short, long, default_value = "app")]
        workspace: String,

        /// Also print the rendered blocks
        #[arg(long)]
        blocks: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Check the configuration file
    Validate,
    /// Print the configuration file path
    Path,
    /// Print a default configuration file
    Init,
}

fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let default = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // An invalid file still gets reported by the command itself
    let logging = AppConfig::load().map(|c| c.logging).unwrap_or_default();
    init_tracing(cli.verbose, &logging);

    match cli.command {
        Commands::Generate {
            request,
            root,
            workspace,
            app_type,
        } => commands::generate::run(&request, root, &workspace, app_type).await?,
        Commands::Predict { request, app_type } => commands::predict::run(&request, app_type)?,
        Commands::Assemble {
            request,
            root,
            workspace,
            blocks,
        } => commands::assemble::run(&request, root, &workspace, blocks).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Init => commands::config_cmd::init(),
        },
    }

    Ok(())
}
