//! CLI entry point for gatehouse.

pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// gatehouse CLI
#[derive(Parser, Debug)]
#[command(name = "gatehouse", version, about = "Authenticated HTTP client with session refresh")]
pub struct Cli {
    /// TOML config file (environment variables still override it)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect bearer tokens
    Token(TokenArgs),
    /// Manage the stored session
    Session(SessionArgs),
    /// Send an authenticated request
    Request(RequestArgs),
}

#[derive(Parser, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommands,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommands {
    /// Decode a token's claims without verifying it
    Inspect {
        /// The token; defaults to the stored session token
        token: Option<String>,
    },
}

#[derive(Parser, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommands,
}

/// Session subcommands for status, login, and logout.
#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Show whether a session is stored and when it expires
    Status,
    /// Store a token obtained elsewhere
    Login {
        #[arg(long)]
        token: String,
    },
    /// Clear the stored session
    Logout,
}

/// Arguments for `gatehouse request`.
#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS)
    pub method: String,
    /// Path relative to the configured base URL
    pub path: String,
    /// JSON body
    #[arg(short, long)]
    pub data: Option<String>,
}
