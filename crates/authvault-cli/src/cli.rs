use clap::{Parser, Subcommand};

/// CLI surface for inspecting and managing stored auth state.
#[derive(Parser, Debug)]
#[command(
    name = "authvault",
    about = "Tenant-scoped storage for OAuth tokens and client registrations",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to a storage health check when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Write, read back and delete a probe record through the selected backend.
    Health,
    /// Print a stored JSON resource.
    Read {
        server_url_hash: String,
        filename: String,
    },
    /// Print a stored text resource.
    ReadText {
        server_url_hash: String,
        filename: String,
        /// Message to report when the resource is missing or not text.
        #[arg(long)]
        error_message: Option<String>,
    },
    /// Store a JSON resource.
    Write {
        server_url_hash: String,
        filename: String,
        /// JSON document to store.
        json: String,
        /// Server URL the hash was derived from; recorded with token records.
        #[arg(long)]
        server_url: Option<String>,
    },
    /// Store a text resource.
    WriteText {
        server_url_hash: String,
        filename: String,
        text: String,
    },
    /// Delete a stored resource (succeeds when already absent).
    Delete {
        server_url_hash: String,
        filename: String,
    },
    /// Manage auth-flow lockfiles.
    #[command(subcommand)]
    Lock(LockCommand),
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum LockCommand {
    /// Record this process as the owner of the auth flow for a server.
    Create {
        server_url_hash: String,
        #[arg(long)]
        port: u16,
    },
    /// Show the current lockfile, if any.
    Check { server_url_hash: String },
    /// Remove the lockfile.
    Remove { server_url_hash: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
    /// Print the effective storage settings (secrets redacted).
    Show,
}
