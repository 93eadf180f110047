//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Postback - media server control panel client
#[derive(Parser)]
#[command(
    name = "pb",
    about = "Talk to a media server through a single-slot request coordinator",
    version,
    after_help = "Logs are written to: ~/.local/share/postback/logs/postback.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Override the server base URL
    #[arg(short, long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Fetch one or more paths; responses print in submission order
    Get {
        /// Paths relative to the server base URL
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,
    },

    /// Poll a status page until stopped
    Poll {
        /// Path relative to the server base URL
        #[arg(value_name = "PATH")]
        path: String,

        /// Delay between polls
        #[arg(short, long, default_value = "5000")]
        interval_ms: u64,

        /// Stop after this many answers
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },

    /// Make one JSON-RPC call
    Rpc {
        /// Method name
        method: String,

        /// Parameters; each is parsed as JSON, falling back to a plain string
        params: Vec<String>,
    },
}

/// Parse a command-line parameter as JSON, or keep it as a string
pub fn parse_param(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
