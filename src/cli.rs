use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Ask questions about your Markdown documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the TOML config (defaults to `DOCENT_CONFIG` or config/default.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server (default).
    Serve(ServeArgs),
    /// Manage API users.
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Override `server.host`.
    #[arg(long)]
    pub host: Option<String>,
    /// Override `server.port`.
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user and print its API token once.
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        /// Allow access to the admin listings.
        #[arg(long)]
        staff: bool,
    },
    /// List all users.
    List,
    /// Re-enable a disabled user.
    Enable { id: i64 },
    /// Block a user's token without deleting their documents.
    Disable { id: i64 },
}
