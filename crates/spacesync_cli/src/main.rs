//! spacesync CLI
//!
//! Mirrors a remote document space into a local directory tree and pushes
//! local edits back.
//!
//! # Commands
//!
//! - `pull` - Download every current document and its attachments
//! - `push` - Create, update and delete remote documents to match local files
//! - `watch` - Push whenever a document file changes, until Ctrl-C
//! - `status` - Show tracked files and pending local changes

mod client;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Sync a remote document space with a local directory.
#[derive(Parser)]
#[command(name = "spacesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Site base URL
    #[arg(global = true, long, env = "CONFLUENCE_URL")]
    url: Option<String>,

    /// Account name for basic authentication
    #[arg(global = true, long, env = "CONFLUENCE_USERNAME")]
    username: Option<String>,

    /// API token for basic authentication
    #[arg(global = true, long, env = "CONFLUENCE_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Key of the space to mirror
    #[arg(global = true, short, long, env = "CONFLUENCE_SPACE_KEY")]
    space: Option<String>,

    /// REST API version
    #[arg(global = true, long, env = "CONFLUENCE_API_VERSION", default_value = "2")]
    api_version: String,

    /// Directory of document files
    #[arg(global = true, long, env = "LOCAL_CONTENT_DIR", default_value = "./content")]
    content_dir: PathBuf,

    /// Directory of downloaded attachments
    #[arg(global = true, long, env = "LOCAL_ATTACHMENTS_DIR", default_value = "./attachments")]
    attachments_dir: PathBuf,

    /// Directory of persisted sync state
    #[arg(global = true, long, env = "LOCAL_CACHE_DIR", default_value = "./cache")]
    cache_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every current document and its attachments
    Pull,

    /// Apply local changes to the remote space
    Push,

    /// Push on every document change until interrupted
    Watch,

    /// Show tracked files and pending local changes
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

impl Cli {
    fn settings(&self) -> Result<commands::Settings, commands::CliError> {
        let required = |value: &Option<String>, name: &'static str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(commands::CliError::MissingSetting(name))
        };
        Ok(commands::Settings {
            url: required(&self.url, "CONFLUENCE_URL")?,
            username: required(&self.username, "CONFLUENCE_USERNAME")?,
            api_token: required(&self.api_token, "CONFLUENCE_API_TOKEN")?,
            space_key: required(&self.space, "CONFLUENCE_SPACE_KEY")?,
            api_version: self.api_version.clone(),
            content_dir: self.content_dir.clone(),
            attachments_dir: self.attachments_dir.clone(),
            cache_dir: self.cache_dir.clone(),
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Pull => commands::pull::run(&cli.settings()?)?,
        Commands::Push => commands::push::run(&cli.settings()?)?,
        Commands::Watch => commands::watch::run(&cli.settings()?)?,
        Commands::Status { format } => commands::status::run(&cli.settings()?, format)?,
        Commands::Version => {
            println!("spacesync v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
